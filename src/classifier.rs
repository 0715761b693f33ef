//! Pre-trained fold classifiers.
//!
//! Models are exported to ONNX and executed with tract. Each model takes the
//! six encoded columns as separate `<column>_input` tensors of shape `[1, 1]`
//! and returns a probability vector over the five tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::encoder::EncodedRow;
use crate::errors::{TierError, TierResult};
use crate::vocabulary::Field;

/// Number of viewership tiers every model predicts.
pub const TIER_COUNT: usize = 5;

pub type Probabilities = [f32; TIER_COUNT];

/// Model family; each one was trained with its own encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Model3,
    Model4,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Model3, ModelFamily::Model4];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Model3 => "model3",
            ModelFamily::Model4 => "model4",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const FOLDS: [u8; 5] = [1, 2, 3, 4, 5];

/// One trained fold of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId {
    pub family: ModelFamily,
    pub fold: u8,
}

impl ModelId {
    pub fn new(family: ModelFamily, fold: u8) -> Self {
        Self { family, fold }
    }

    /// All ten models in ensemble order: model3 folds 1..5 then model4 folds 1..5.
    pub fn ensemble_order() -> Vec<ModelId> {
        ModelFamily::ALL
            .iter()
            .flat_map(|family| FOLDS.iter().map(move |fold| ModelId::new(*family, *fold)))
            .collect()
    }

    /// Artifact stem, e.g. `model3_fold1_best`.
    pub fn artifact_name(&self) -> String {
        format!("{}_fold{}_best", self.family, self.fold)
    }

    pub fn artifact_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("{}.onnx", self.artifact_name()))
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.artifact_name())
    }
}

/// A classifier producing tier probabilities for one encoded row.
pub trait Classifier: Send + Sync {
    fn id(&self) -> ModelId;
    fn predict(&self, row: &EncodedRow) -> TierResult<Probabilities>;
}

/// Source of classifiers, one per [`ModelId`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, id: ModelId) -> TierResult<Arc<dyn Classifier>>;
}

/// Element type of the model inputs, fixed when the models were exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputDType {
    #[default]
    Float32,
    Int32,
    Int64,
}

impl InputDType {
    fn fact(&self) -> InferenceFact {
        match self {
            InputDType::Float32 => f32::fact([1, 1]).into(),
            InputDType::Int32 => i32::fact([1, 1]).into(),
            InputDType::Int64 => i64::fact([1, 1]).into(),
        }
    }

    fn tensor(&self, code: i64) -> Tensor {
        match self {
            InputDType::Float32 => tensor2(&[[code as f32]]),
            InputDType::Int32 => tensor2(&[[code as i32]]),
            InputDType::Int64 => tensor2(&[[code]]),
        }
    }
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ONNX model executed with tract.
pub struct OnnxClassifier {
    id: ModelId,
    plan: OnnxPlan,
    /// Field fed to each graph input, in graph input order.
    input_order: Vec<Field>,
    dtype: InputDType,
}

impl OnnxClassifier {
    pub fn load(id: ModelId, path: &Path, dtype: InputDType) -> TierResult<Self> {
        let model_err = |message: String| TierError::model(id.artifact_name(), message);

        if !path.exists() {
            return Err(model_err(format!("missing artifact {}", path.display())));
        }

        let mut model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| model_err(format!("failed to parse: {e}")))?;

        let graph_inputs: Vec<String> = model
            .input_outlets()
            .map_err(|e| model_err(e.to_string()))?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();
        let input_order = match_inputs(&graph_inputs).map_err(model_err)?;

        for idx in 0..input_order.len() {
            model = model
                .with_input_fact(idx, dtype.fact())
                .map_err(|e| model_err(format!("input {idx}: {e}")))?;
        }

        let plan = model
            .into_optimized()
            .and_then(|m| m.into_runnable())
            .map_err(|e| model_err(format!("failed to optimize: {e}")))?;

        debug!(model = %id, inputs = ?graph_inputs, "onnx model ready");
        Ok(Self {
            id,
            plan,
            input_order,
            dtype,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn id(&self) -> ModelId {
        self.id
    }

    fn predict(&self, row: &EncodedRow) -> TierResult<Probabilities> {
        if row.family != self.id.family {
            return Err(TierError::model(
                self.id.artifact_name(),
                format!("received a {} encoding", row.family),
            ));
        }

        let inputs: TVec<TValue> = self
            .input_order
            .iter()
            .map(|field| self.dtype.tensor(row.code(*field)).into())
            .collect();

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| TierError::model(self.id.artifact_name(), format!("inference failed: {e}")))?;
        let first = outputs
            .first()
            .ok_or_else(|| TierError::model(self.id.artifact_name(), "model produced no output"))?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| TierError::model(self.id.artifact_name(), e.to_string()))?;

        to_probabilities(self.id, view.iter().copied())
    }
}

/// Loads `model{3,4}_fold{n}_best.onnx` files from one directory.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    models_dir: PathBuf,
    dtype: InputDType,
}

impl OnnxLoader {
    pub fn new(models_dir: impl Into<PathBuf>, dtype: InputDType) -> Self {
        Self {
            models_dir: models_dir.into(),
            dtype,
        }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, id: ModelId) -> TierResult<Arc<dyn Classifier>> {
        let path = id.artifact_path(&self.models_dir);
        info!(model = %id, path = %path.display(), "loading model");
        Ok(Arc::new(OnnxClassifier::load(id, &path, self.dtype)?))
    }
}

/// Validate a raw model output as a single-row 5-way distribution.
pub fn to_probabilities(id: ModelId, values: impl IntoIterator<Item = f32>) -> TierResult<Probabilities> {
    let values: Vec<f32> = values.into_iter().collect();
    let probs: Probabilities = values.as_slice().try_into().map_err(|_| {
        TierError::model(
            id.artifact_name(),
            format!("expected {TIER_COUNT} probabilities, got {}", values.len()),
        )
    })?;
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(TierError::model(id.artifact_name(), "non-finite probability"));
    }
    Ok(probs)
}

fn normalize_input_name(name: &str) -> String {
    let name = match name.rsplit_once(':') {
        Some((stem, port)) if port.chars().all(|c| c.is_ascii_digit()) => stem,
        _ => name,
    };
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map graph input names onto fields, tolerating the separator rewrites
/// exporters apply to names with spaces or dashes.
fn match_inputs(graph_inputs: &[String]) -> Result<Vec<Field>, String> {
    if graph_inputs.len() != Field::ALL.len() {
        return Err(format!(
            "expected {} inputs, model declares {}",
            Field::ALL.len(),
            graph_inputs.len()
        ));
    }

    let mut order = Vec::with_capacity(graph_inputs.len());
    for name in graph_inputs {
        let wanted = normalize_input_name(name);
        let field = Field::ALL
            .into_iter()
            .find(|f| normalize_input_name(&f.input_name()) == wanted)
            .ok_or_else(|| format!("unexpected model input '{name}'"))?;
        if order.contains(&field) {
            return Err(format!("input for {field} declared twice"));
        }
        order.push(field);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_order_lists_ten_models() {
        let ids = ModelId::ensemble_order();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids[0].artifact_name(), "model3_fold1_best");
        assert_eq!(ids[4].artifact_name(), "model3_fold5_best");
        assert_eq!(ids[5].artifact_name(), "model4_fold1_best");
        assert_eq!(ids[9].artifact_name(), "model4_fold5_best");
    }

    #[test]
    fn artifact_path_uses_onnx_extension() {
        let id = ModelId::new(ModelFamily::Model4, 2);
        assert_eq!(
            id.artifact_path(Path::new("/srv/models")),
            PathBuf::from("/srv/models/model4_fold2_best.onnx")
        );
    }

    #[test]
    fn inputs_match_despite_exporter_renames() {
        let names: Vec<String> = [
            "Story_Format_input",
            "Personality_Popularity_input:0",
            "Genre_input",
            "personality-genre_input",
            "Geography_input",
            "Logistics_input",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let order = match_inputs(&names).unwrap();
        assert_eq!(order[0], Field::StoryFormat);
        assert_eq!(order[1], Field::PersonalityPopularity);
        assert_eq!(order[3], Field::PersonalityGenre);
    }

    #[test]
    fn unknown_or_missing_inputs_are_rejected() {
        let names: Vec<String> = vec!["Genre_input".into(), "Age_input".into()];
        assert!(match_inputs(&names).unwrap_err().contains("expected 6"));

        let mut names: Vec<String> = Field::ALL.iter().map(|f| f.input_name()).collect();
        names[5] = "Genre_input".into();
        assert!(match_inputs(&names).is_err());
    }

    #[test]
    fn output_shape_is_checked() {
        let id = ModelId::new(ModelFamily::Model3, 1);
        assert!(to_probabilities(id, [0.2; 5]).is_ok());
        assert!(to_probabilities(id, [0.25; 4]).is_err());
        assert!(to_probabilities(id, [0.1, 0.2, f32::NAN, 0.3, 0.4]).is_err());
    }

    /// `tests/fixtures/onnx/model3_fold1_best.onnx` is softmax(concat(inputs) x W + b)
    /// with `W[i][j] = ((i + 1) * (j + 1) % 7) / 4` and `b[j] = j / 10`. Its graph
    /// declares the inputs out of column order.
    fn fixture_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/onnx")
    }

    fn fixture_row(family: ModelFamily) -> EncodedRow {
        EncodedRow {
            family,
            codes: [3, 1, 2, 5, 0, 4],
            popularity_ord: 2,
        }
    }

    #[test]
    fn graph_inputs_are_bound_by_name() {
        let id = ModelId::new(ModelFamily::Model3, 1);
        let model = OnnxClassifier::load(id, &id.artifact_path(&fixture_dir()), InputDType::Float32).unwrap();
        assert_eq!(
            model.input_order,
            vec![
                Field::StoryFormat,
                Field::PersonalityPopularity,
                Field::Genre,
                Field::PersonalityGenre,
                Field::Geography,
                Field::Logistics,
            ]
        );
    }

    #[test]
    fn onnx_model_scores_an_encoded_row() {
        let loader = OnnxLoader::new(fixture_dir(), InputDType::Float32);
        let model = loader.load(ModelId::new(ModelFamily::Model3, 1)).unwrap();

        let probs = model.predict(&fixture_row(ModelFamily::Model3)).unwrap();
        let expected = [0.115_185, 0.017_228, 0.491_047, 0.012_763, 0.363_777];
        for (tier, (got, want)) in probs.iter().zip(expected).enumerate() {
            assert!((got - want).abs() < 1e-4, "tier {tier}: got {got}, want {want}");
        }
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn onnx_model_refuses_the_other_family() {
        let loader = OnnxLoader::new(fixture_dir(), InputDType::Float32);
        let model = loader.load(ModelId::new(ModelFamily::Model3, 1)).unwrap();
        let err = model.predict(&fixture_row(ModelFamily::Model4)).unwrap_err();
        assert!(err.to_string().contains("model4 encoding"));
    }

    #[test]
    fn missing_artifact_is_a_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = OnnxLoader::new(dir.path(), InputDType::Float32);
        let err = loader.load(ModelId::new(ModelFamily::Model3, 1)).err().unwrap();
        assert!(err.to_string().contains("model3_fold1_best"));
    }
}
