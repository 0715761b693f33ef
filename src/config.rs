//! Layered service configuration.
//!
//! Serialized defaults, then `story_tier.toml` (or the file named by
//! `STORY_TIER_CONFIG`), then `TIER_*` environment variables. Nested keys use
//! a double underscore, e.g. `TIER_AUTH__COOKIE_KEY`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::session::MAX_SESSION_DAYS;
use crate::classifier::InputDType;
use crate::ensemble::{EnsembleWeights, DEFAULT_WEIGHTS};
use crate::errors::{TierError, TierResult};
use crate::model_cache::LoadPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "story_tier.toml";
pub const CONFIG_PATH_ENV: &str = "STORY_TIER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub artifacts: ArtifactConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// YAML allow-list of users
    pub credentials_path: PathBuf,
    pub cookie_name: String,
    /// HMAC key for session cookies; required
    pub cookie_key: String,
    pub cookie_expiry_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub models_dir: PathBuf,
    pub model3_encoder: PathBuf,
    pub model4_encoder: PathBuf,
    #[serde(default)]
    pub input_dtype: InputDType,
    #[serde(default)]
    pub load_policy: LoadPolicy,
    /// Load every model at start instead of on the first prediction.
    #[serde(default)]
    pub warm_on_start: bool,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    Sheets,
    File,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSourceKind {
    /// service-account key (or a pre-issued `access_token`) from the secrets file
    Secrets,
    /// cloud metadata server of the host
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    pub spreadsheet_name: String,
    /// Skips the lookup by name when set.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
    #[serde(default)]
    pub secrets_path: Option<PathBuf>,
    pub token_source: TokenSourceKind,
    /// Fixed offset of the timestamp column (IST by default).
    pub utc_offset_minutes: i32,
    pub timeout_secs: u64,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub title: String,
    #[serde(default)]
    pub footer_contact: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Hindi News Story Viewership Tier Prediction".to_string(),
            footer_contact: None,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8501,
            },
            auth: AuthConfig {
                credentials_path: PathBuf::from("allowed_users.yaml"),
                cookie_name: "news_app_cookie_test".to_string(),
                cookie_key: String::new(),
                cookie_expiry_days: 7,
            },
            artifacts: ArtifactConfig {
                models_dir: PathBuf::from("models"),
                model3_encoder: PathBuf::from("label_encoders_model3.json"),
                model4_encoder: PathBuf::from("label_encoders_model4.json"),
                input_dtype: InputDType::default(),
                load_policy: LoadPolicy::default(),
                warm_on_start: false,
                weights: DEFAULT_WEIGHTS.to_vec(),
            },
            audit: AuditConfig {
                sink: AuditSinkKind::Sheets,
                spreadsheet_name: "Streamlit_login_track".to_string(),
                spreadsheet_id: None,
                worksheet: "movie_app".to_string(),
                secrets_path: None,
                token_source: TokenSourceKind::Secrets,
                utc_offset_minutes: 330,
                timeout_secs: 30,
                file_path: PathBuf::from("logs/logins.csv"),
            },
            ui: UiConfig::default(),
        }
    }
}

impl TierConfig {
    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> TierResult<()> {
        if self.auth.cookie_key.trim().is_empty() {
            return Err(TierError::config("auth.cookie_key must be set"));
        }
        if self.auth.cookie_expiry_days == 0 || self.auth.cookie_expiry_days > MAX_SESSION_DAYS {
            return Err(TierError::config(format!(
                "auth.cookie_expiry_days must be between 1 and {MAX_SESSION_DAYS}"
            )));
        }
        if self.audit.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(TierError::config("audit.utc_offset_minutes out of range"));
        }
        if self.audit.sink == AuditSinkKind::Sheets
            && self.audit.token_source == TokenSourceKind::Secrets
            && self.audit.secrets_path.is_none()
        {
            return Err(TierError::config(
                "audit.secrets_path is required for the sheets sink with secrets tokens",
            ));
        }
        self.weights()?;
        Ok(())
    }

    pub fn weights(&self) -> TierResult<EnsembleWeights> {
        EnsembleWeights::new(&self.artifacts.weights)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Build the figment for a config file path.
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(TierConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TIER_").split("__"))
}

/// Load and validate configuration. `path` overrides the env and default file.
pub fn load_config(path: Option<&Path>) -> TierResult<TierConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
    };

    let config: TierConfig = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_require_a_cookie_key() {
        let config = TierConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cookie_key"));
    }

    #[test]
    fn cookie_expiry_is_bounded() {
        let mut config = TierConfig::default();
        config.auth.cookie_key = "k".into();
        config.audit.sink = AuditSinkKind::Disabled;
        assert!(config.validate().is_ok());

        config.auth.cookie_expiry_days = u32::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cookie_expiry_days"));

        config.auth.cookie_expiry_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_and_env_layers_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "story_tier.toml",
                r#"
                log_level = "debug"

                [auth]
                cookie_key = "from-file"

                [audit]
                sink = "file"

                [artifacts]
                load_policy = "per_request"
                input_dtype = "int64"
                "#,
            )?;
            jail.set_env("TIER_SERVER__PORT", "9000");
            jail.set_env("TIER_AUTH__COOKIE_EXPIRY_DAYS", "3");

            let config = load_config(Some(Path::new("story_tier.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.auth.cookie_key, "from-file");
            assert_eq!(config.auth.cookie_name, "news_app_cookie_test");
            assert_eq!(config.auth.cookie_expiry_days, 3);
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.audit.sink, AuditSinkKind::File);
            assert_eq!(config.audit.worksheet, "movie_app");
            assert_eq!(config.artifacts.load_policy, LoadPolicy::PerRequest);
            assert_eq!(config.artifacts.input_dtype, InputDType::Int64);
            assert_eq!(config.artifacts.weights, DEFAULT_WEIGHTS.to_vec());
            Ok(())
        });
    }

    #[test]
    fn sheets_sink_needs_secrets() {
        let mut config = TierConfig::default();
        config.auth.cookie_key = "k".into();
        assert!(config.validate().is_err());

        config.audit.secrets_path = Some(PathBuf::from("secrets.json"));
        assert!(config.validate().is_ok());

        config.audit.secrets_path = None;
        config.audit.token_source = TokenSourceKind::Metadata;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_weights_fail_validation() {
        let mut config = TierConfig::default();
        config.auth.cookie_key = "k".into();
        config.audit.sink = AuditSinkKind::Disabled;
        config.artifacts.weights.pop();
        assert!(config.validate().is_err());
    }
}
