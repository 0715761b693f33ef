//! Encode a story and score it with the fold ensemble.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classifier::ModelLoader;
use crate::encoder::{EncodedPair, FeatureEncoder};
use crate::ensemble::{EnsembleWeights, PredictionResult};
use crate::errors::{TierError, TierResult};
use crate::model_cache::{LoadPolicy, ModelCache};
use crate::story::StoryAttributes;

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub story: StoryAttributes,
    pub encoded: EncodedPair,
    #[serde(flatten)]
    pub result: PredictionResult,
}

pub struct Predictor {
    encoder: FeatureEncoder,
    models: ModelCache,
}

impl Predictor {
    pub fn new(encoder: FeatureEncoder, models: ModelCache) -> Self {
        Self { encoder, models }
    }

    pub fn with_loader(
        encoder: FeatureEncoder,
        loader: Arc<dyn ModelLoader>,
        weights: EnsembleWeights,
        policy: LoadPolicy,
    ) -> Self {
        Self::new(encoder, ModelCache::new(loader, weights, policy))
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    /// Blocking; loads models on a cache miss.
    pub fn predict(&self, story: &StoryAttributes) -> TierResult<Prediction> {
        let encoded = self.encoder.encode(story);
        debug!(
            model3 = ?encoded.model3.codes,
            model4 = ?encoded.model4.codes,
            popularity_ord = encoded.model3.popularity_ord,
            "story encoded"
        );

        let result = self.models.ensemble()?.score(&encoded)?;
        info!(tier = result.tier.index(), label = result.label, "prediction made");
        Ok(Prediction {
            story: *story,
            encoded,
            result,
        })
    }

    /// Runs [`Predictor::predict`] on the blocking pool.
    pub async fn predict_async(self: &Arc<Self>, story: StoryAttributes) -> TierResult<Prediction> {
        let predictor = Arc::clone(self);
        tokio::task::spawn_blocking(move || predictor.predict(&story))
            .await
            .map_err(|e| TierError::internal(format!("prediction task failed: {e}")))?
    }
}
