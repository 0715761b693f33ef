use std::sync::Arc;
use tracing::info;

use crate::audit::{build_login_audit, LoginAudit};
use crate::auth::{CredentialStore, SessionSigner};
use crate::classifier::{ModelLoader, OnnxLoader};
use crate::config::TierConfig;
use crate::encoder::FeatureEncoder;
use crate::errors::TierResult;
use crate::predictor::Predictor;

/// Shared by every request; immutable after start-up.
pub struct AppState {
    pub config: TierConfig,
    pub credentials: CredentialStore,
    pub signer: SessionSigner,
    pub audit: LoginAudit,
    pub predictor: Arc<Predictor>,
}

impl AppState {
    pub fn new(
        config: TierConfig,
        credentials: CredentialStore,
        audit: LoginAudit,
        predictor: Predictor,
    ) -> TierResult<Self> {
        let signer = SessionSigner::new(&config.auth.cookie_key, config.auth.cookie_expiry_days)?;
        Ok(Self {
            config,
            credentials,
            signer,
            audit,
            predictor: Arc::new(predictor),
        })
    }

    /// Wire the service from configuration: allow-list, encoders, ONNX
    /// models and the audit sink.
    pub fn from_config(config: TierConfig) -> TierResult<Self> {
        config.validate()?;
        let credentials = CredentialStore::load(&config.auth.credentials_path)?;
        let audit = build_login_audit(&config.audit)?;
        let predictor = predictor_from_config(&config)?;

        if config.artifacts.warm_on_start {
            predictor.models().warm()?;
        }
        info!(
            users = credentials.len(),
            audit_sink = audit.sink_name(),
            load_policy = ?config.artifacts.load_policy,
            "application state ready"
        );
        Self::new(config, credentials, audit, predictor)
    }
}

/// Encoders and ONNX loader named by the artifact settings.
pub fn predictor_from_config(config: &TierConfig) -> TierResult<Predictor> {
    let artifacts = &config.artifacts;
    let encoder = FeatureEncoder::load(&artifacts.model3_encoder, &artifacts.model4_encoder)?;
    let loader: Arc<dyn ModelLoader> =
        Arc::new(OnnxLoader::new(&artifacts.models_dir, artifacts.input_dtype));
    Ok(Predictor::with_loader(
        encoder,
        loader,
        config.weights()?,
        artifacts.load_policy,
    ))
}
