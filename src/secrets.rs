//! Service-account secrets used by the spreadsheet audit sink.
//!
//! The file is JSON, either the account object itself (a downloaded key
//! file) or wrapped as `{"service_account": {...}}`.

use serde::Deserialize;
use std::path::Path;

use crate::errors::{TierError, TierResult};

#[derive(Clone, Default, Deserialize)]
pub struct ServiceAccount {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// PEM-encoded RSA key that signs token assertions.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    /// Pre-issued OAuth bearer token, used when there is no private key.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("kind", &self.kind)
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecretsFile {
    Wrapped { service_account: ServiceAccount },
    Bare(ServiceAccount),
}

impl ServiceAccount {
    pub fn load(path: impl AsRef<Path>) -> TierResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierError::io(format!("reading secrets {}", path.display()), e))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> TierResult<Self> {
        let file: SecretsFile = serde_json::from_str(content)
            .map_err(|e| TierError::serialization("secrets file", e))?;
        Ok(match file {
            SecretsFile::Wrapped { service_account } => service_account,
            SecretsFile::Bare(account) => account,
        })
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn require_access_token(&self) -> TierResult<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TierError::config("secrets file has no access_token"))
    }
}

impl std::fmt::Display for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.client_email.as_deref().unwrap_or("<unnamed account>"))
    }
}
