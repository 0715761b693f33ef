//! Weighted soft voting over the ten fold models.
//!
//! `total = sum(w_i * p_i)` over model3 folds 1..5 (variant A encoding) and
//! model4 folds 1..5 (variant B encoding). The weights come from per-fold F1
//! scores and are used as given, without renormalisation.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::classifier::{Classifier, ModelId, ModelLoader, Probabilities, TIER_COUNT};
use crate::encoder::EncodedPair;
use crate::errors::{TierError, TierResult};
use crate::tier::Tier;

pub const ENSEMBLE_SIZE: usize = 10;

/// Per-fold weights in ensemble order.
pub const DEFAULT_WEIGHTS: [f64; ENSEMBLE_SIZE] = [
    0.0838, 0.0720, 0.1210, 0.0938, 0.1080, 0.0780, 0.0907, 0.1180, 0.1121, 0.1227,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleWeights([f64; ENSEMBLE_SIZE]);

impl EnsembleWeights {
    /// Exactly ten weights, each strictly between 0 and 1.
    pub fn new(weights: &[f64]) -> TierResult<Self> {
        let fixed: [f64; ENSEMBLE_SIZE] = weights.try_into().map_err(|_| {
            TierError::config(format!(
                "ensemble needs {ENSEMBLE_SIZE} weights, got {}",
                weights.len()
            ))
        })?;
        if let Some((idx, w)) = fixed
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0 && **w < 1.0))
        {
            return Err(TierError::config(format!(
                "weight {idx} must be in (0, 1), got {w}"
            )));
        }
        Ok(Self(fixed))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self(DEFAULT_WEIGHTS)
    }
}

/// Combined scores and the chosen tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub scores: [f64; TIER_COUNT],
    pub tier: Tier,
    pub label: &'static str,
}

impl PredictionResult {
    pub fn from_scores(scores: [f64; TIER_COUNT]) -> TierResult<Self> {
        let tier = Tier::from_index(argmax_first(&scores))?;
        Ok(Self {
            scores,
            tier,
            label: tier.label(),
        })
    }
}

/// Weighted sum of probability vectors.
pub fn soft_vote<I>(votes: I) -> [f64; TIER_COUNT]
where
    I: IntoIterator<Item = (f64, Probabilities)>,
{
    let mut total = [0.0_f64; TIER_COUNT];
    for (weight, probs) in votes {
        for (acc, p) in total.iter_mut().zip(probs) {
            *acc += weight * f64::from(p);
        }
    }
    total
}

/// Index of the maximum; among equal maxima the lowest index wins.
pub fn argmax_first(scores: &[f64; TIER_COUNT]) -> usize {
    let mut best = 0;
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = idx;
        }
    }
    best
}

/// The ten loaded classifiers paired with their weights.
pub struct Ensemble {
    members: Vec<(Arc<dyn Classifier>, f64)>,
}

impl Ensemble {
    /// Load every fold through `loader`. Any missing model fails the whole load.
    pub fn load(loader: &dyn ModelLoader, weights: &EnsembleWeights) -> TierResult<Self> {
        let models = ModelId::ensemble_order()
            .into_iter()
            .map(|id| loader.load(id))
            .collect::<TierResult<Vec<_>>>()?;
        Self::from_models(models, weights)
    }

    pub fn from_models(models: Vec<Arc<dyn Classifier>>, weights: &EnsembleWeights) -> TierResult<Self> {
        let expected = ModelId::ensemble_order();
        if models.len() != expected.len() {
            return Err(TierError::internal(format!(
                "ensemble needs {} models, got {}",
                expected.len(),
                models.len()
            )));
        }
        for (model, id) in models.iter().zip(&expected) {
            if model.id() != *id {
                return Err(TierError::internal(format!(
                    "model {} loaded in the slot of {id}",
                    model.id()
                )));
            }
        }

        let members = models
            .into_iter()
            .zip(weights.as_slice().iter().copied())
            .collect();
        Ok(Self { members })
    }

    pub fn model_ids(&self) -> Vec<ModelId> {
        self.members.iter().map(|(m, _)| m.id()).collect()
    }

    /// Run every model on the encoding of its family and soft-vote.
    pub fn score(&self, encoded: &EncodedPair) -> TierResult<PredictionResult> {
        let mut votes = Vec::with_capacity(self.members.len());
        for (model, weight) in &self.members {
            let row = encoded.for_family(model.id().family);
            let probs = model.predict(row)?;
            debug!(model = %model.id(), weight, ?probs, "fold vote");
            votes.push((*weight, probs));
        }

        let result = PredictionResult::from_scores(soft_vote(votes))?;
        debug!(tier = result.tier.index(), scores = ?result.scores, "ensemble decision");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ModelFamily;
    use crate::encoder::EncodedRow;

    struct Fixed {
        id: ModelId,
        probs: Probabilities,
    }

    impl Classifier for Fixed {
        fn id(&self) -> ModelId {
            self.id
        }

        fn predict(&self, row: &EncodedRow) -> TierResult<Probabilities> {
            assert_eq!(row.family, self.id.family);
            Ok(self.probs)
        }
    }

    fn row(family: ModelFamily) -> EncodedRow {
        EncodedRow {
            family,
            codes: [0; 6],
            popularity_ord: 2,
        }
    }

    fn pair() -> EncodedPair {
        EncodedPair {
            model3: row(ModelFamily::Model3),
            model4: row(ModelFamily::Model4),
        }
    }

    fn models(probs_for: impl Fn(ModelId) -> Probabilities) -> Vec<Arc<dyn Classifier>> {
        ModelId::ensemble_order()
            .into_iter()
            .map(|id| Arc::new(Fixed { id, probs: probs_for(id) }) as Arc<dyn Classifier>)
            .collect()
    }

    #[test]
    fn default_weights_are_valid_and_not_normalised() {
        let weights = EnsembleWeights::default();
        assert_eq!(weights.as_slice().len(), ENSEMBLE_SIZE);
        assert!(EnsembleWeights::new(&DEFAULT_WEIGHTS).is_ok());
        assert!((weights.sum() - 1.0001).abs() < 1e-9);
    }

    #[test]
    fn weights_are_validated() {
        assert!(EnsembleWeights::new(&DEFAULT_WEIGHTS[..9]).is_err());
        let mut bad = DEFAULT_WEIGHTS;
        bad[3] = 1.0;
        assert!(EnsembleWeights::new(&bad).is_err());
        bad[3] = 0.0;
        assert!(EnsembleWeights::new(&bad).is_err());
    }

    #[test]
    fn soft_vote_is_weighted_sum() {
        let total = soft_vote([(0.5, [1.0, 0.0, 0.0, 0.0, 0.0]), (0.25, [0.0, 1.0, 0.0, 0.0, 0.0])]);
        assert_eq!(total, [0.5, 0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn ties_go_to_the_lowest_tier() {
        assert_eq!(argmax_first(&[0.1, 0.4, 0.4, 0.05, 0.05]), 1);
        assert_eq!(argmax_first(&[0.2; 5]), 0);
        assert_eq!(argmax_first(&[0.0, 0.0, 0.0, 0.0, 0.1]), 4);
    }

    #[test]
    fn heavier_folds_outvote_lighter_ones() {
        // model3 folds vote tier 1, model4 folds vote tier 3; model4 weights sum higher
        let ensemble = Ensemble::from_models(
            models(|id| match id.family {
                ModelFamily::Model3 => [0.0, 1.0, 0.0, 0.0, 0.0],
                ModelFamily::Model4 => [0.0, 0.0, 0.0, 1.0, 0.0],
            }),
            &EnsembleWeights::default(),
        )
        .unwrap();

        let result = ensemble.score(&pair()).unwrap();
        assert_eq!(result.tier, Tier::High);
        assert_eq!(result.label, "High viewership");
        assert!((result.scores[1] - 0.4786).abs() < 1e-6);
        assert!((result.scores[3] - 0.5215).abs() < 1e-6);
    }

    #[test]
    fn scoring_is_deterministic() {
        let ensemble = Ensemble::from_models(
            models(|id| {
                let f = f32::from(id.fold) / 10.0;
                [0.1, f, 0.2, 0.3 - f / 2.0, 0.1]
            }),
            &EnsembleWeights::default(),
        )
        .unwrap();
        let first = ensemble.score(&pair()).unwrap();
        for _ in 0..5 {
            assert_eq!(ensemble.score(&pair()).unwrap(), first);
        }
    }

    #[test]
    fn misordered_models_are_rejected() {
        let mut list = models(|_| [0.2; 5]);
        list.swap(0, 9);
        assert!(Ensemble::from_models(list, &EnsembleWeights::default()).is_err());
        assert!(Ensemble::from_models(models(|_| [0.2; 5])[..9].to_vec(), &EnsembleWeights::default()).is_err());
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self, id: ModelId) -> TierResult<Arc<dyn Classifier>> {
            Err(TierError::model(id.artifact_name(), "missing artifact"))
        }
    }

    #[test]
    fn missing_model_fails_the_load() {
        let err = Ensemble::load(&FailingLoader, &EnsembleWeights::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("model3_fold1_best"));
    }
}
