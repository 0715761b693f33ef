//! Process-wide, read-only cache of loaded fold models.
//!
//! Artifacts are immutable for the lifetime of a deployment, so a model that
//! has been loaded once is never invalidated. With [`LoadPolicy::PerRequest`]
//! the cache is bypassed and every prediction reloads all ten artifacts.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::classifier::{Classifier, ModelId, ModelLoader};
use crate::ensemble::{Ensemble, EnsembleWeights};
use crate::errors::{SafeLock, TierResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Load each model on first use and keep it.
    #[default]
    Cached,
    /// Reload every artifact for every prediction.
    PerRequest,
}

type Slot = Mutex<Option<Arc<dyn Classifier>>>;

pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    weights: EnsembleWeights,
    policy: LoadPolicy,
    /// One slot per model in ensemble order; a slot is locked only while its own artifact loads.
    slots: Vec<(ModelId, Slot)>,
    cached: AtomicUsize,
    artifact_loads: AtomicUsize,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, weights: EnsembleWeights, policy: LoadPolicy) -> Self {
        Self {
            loader,
            weights,
            policy,
            slots: ModelId::ensemble_order()
                .into_iter()
                .map(|id| (id, Mutex::new(None)))
                .collect(),
            cached: AtomicUsize::new(0),
            artifact_loads: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// Blocking: may parse ONNX artifacts.
    pub fn ensemble(&self) -> TierResult<Ensemble> {
        let models = match self.policy {
            LoadPolicy::PerRequest => self
                .slots
                .iter()
                .map(|(id, _)| self.load_artifact(*id))
                .collect::<TierResult<Vec<_>>>()?,
            LoadPolicy::Cached => self
                .slots
                .iter()
                .map(|(id, slot)| self.cached_model(*id, slot))
                .collect::<TierResult<Vec<_>>>()?,
        };
        Ensemble::from_models(models, &self.weights)
    }

    /// Load all models up front. A no-op for the per-request policy.
    pub fn warm(&self) -> TierResult<usize> {
        if self.policy == LoadPolicy::PerRequest {
            return Ok(0);
        }
        let ensemble = self.ensemble()?;
        let count = ensemble.model_ids().len();
        info!(models = count, "model cache warmed");
        Ok(count)
    }

    /// Models currently held. Never waits on a load in progress.
    pub fn cached_models(&self) -> usize {
        self.cached.load(Ordering::Acquire)
    }

    /// Total artifact loads since start.
    pub fn artifact_loads(&self) -> usize {
        self.artifact_loads.load(Ordering::Relaxed)
    }

    fn cached_model(&self, id: ModelId, slot: &Slot) -> TierResult<Arc<dyn Classifier>> {
        let mut slot = slot.safe_lock("model slot")?;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }
        let model = self.load_artifact(id)?;
        *slot = Some(model.clone());
        self.cached.fetch_add(1, Ordering::Release);
        Ok(model)
    }

    fn load_artifact(&self, id: ModelId) -> TierResult<Arc<dyn Classifier>> {
        let model = self.loader.load(id)?;
        self.artifact_loads.fetch_add(1, Ordering::Relaxed);
        Ok(model)
    }
}
