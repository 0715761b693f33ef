#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use story_tier::app_state::AppState;
use story_tier::audit::{fixed_offset, AuditRow, AuditSink, LoginAudit, MemoryAuditSink};
use story_tier::auth::{hash_password, CredentialStore};
use story_tier::classifier::{Classifier, ModelId, ModelLoader, Probabilities};
use story_tier::config::{AuditSinkKind, TierConfig};
use story_tier::encoder::{sorted_classes, EncodedRow, FeatureEncoder};
use story_tier::ensemble::EnsembleWeights;
use story_tier::errors::{TierError, TierResult};
use story_tier::model_cache::LoadPolicy;
use story_tier::predictor::Predictor;
use story_tier::vocabulary::Field;

pub const USERNAME: &str = "jsmith";
pub const PASSWORD: &str = "s3cret-pass";
pub const COOKIE_NAME: &str = "news_app_cookie_test";

pub const SPORTS_FORM: &str = "genre=SPORTS+NEWS&geography=INDIAN&personality_popularity=H\
&personality_genre=Cricketer&logistics=ON+LOCATION&story_format=NEWS+REPORT";

/// Every classifier puts most of its mass on one tier.
pub struct PeakedModel {
    id: ModelId,
    tier: usize,
}

impl Classifier for PeakedModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn predict(&self, row: &EncodedRow) -> TierResult<Probabilities> {
        if row.family != self.id.family {
            return Err(TierError::model(self.id.artifact_name(), "fed the wrong encoding"));
        }
        let mut probs = [0.1_f32; 5];
        probs[self.tier] = 0.6;
        Ok(probs)
    }
}

pub struct PeakedLoader {
    pub tier: usize,
}

impl ModelLoader for PeakedLoader {
    fn load(&self, id: ModelId) -> TierResult<Arc<dyn Classifier>> {
        Ok(Arc::new(PeakedModel { id, tier: self.tier }))
    }
}

pub struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn append_row(&self, _row: &AuditRow) -> TierResult<()> {
        Err(TierError::audit("append row", "worksheet unavailable"))
    }
}

/// Label-encoder layout: each column's sorted class list.
pub fn write_encoders(dir: &Path) -> (PathBuf, PathBuf) {
    let table: BTreeMap<&str, Vec<String>> = Field::ALL
        .iter()
        .map(|field| (field.column(), sorted_classes(*field)))
        .collect();
    let json = serde_json::to_string_pretty(&table).unwrap();

    let model3 = dir.join("label_encoders_model3.json");
    let model4 = dir.join("label_encoders_model4.json");
    std::fs::write(&model3, &json).unwrap();
    std::fs::write(&model4, &json).unwrap();
    (model3, model4)
}

pub fn write_credentials(dir: &Path) -> PathBuf {
    let hash = hash_password(PASSWORD, 4).unwrap();
    let yaml = format!(
        "credentials:\n  usernames:\n    JSmith:\n      name: John Smith\n      email: jsmith@example.com\n      password: \"{hash}\"\n"
    );
    let path = dir.join("allowed_users.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

pub fn test_config(dir: &Path) -> TierConfig {
    let mut config = TierConfig::default();
    let (model3, model4) = write_encoders(dir);
    config.auth.cookie_key = "integration-test-key".into();
    config.auth.credentials_path = write_credentials(dir);
    config.artifacts.model3_encoder = model3;
    config.artifacts.model4_encoder = model4;
    config.artifacts.models_dir = dir.join("models");
    config.audit.sink = AuditSinkKind::Disabled;
    config
}

pub fn state_with_sink(dir: &Path, sink: Arc<dyn AuditSink>, tier: usize) -> Arc<AppState> {
    let config = test_config(dir);
    let credentials = CredentialStore::load(&config.auth.credentials_path).unwrap();
    let encoder =
        FeatureEncoder::load(&config.artifacts.model3_encoder, &config.artifacts.model4_encoder)
            .unwrap();
    let predictor = Predictor::with_loader(
        encoder,
        Arc::new(PeakedLoader { tier }),
        EnsembleWeights::default(),
        LoadPolicy::Cached,
    );
    let audit = LoginAudit::new(sink, fixed_offset(330).unwrap());
    Arc::new(AppState::new(config, credentials, audit, predictor).unwrap())
}

pub fn state(dir: &Path) -> (Arc<AppState>, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    (state_with_sink(dir, sink.clone(), 3), sink)
}
