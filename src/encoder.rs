//! Feature encoding for the two model families.
//!
//! Each family was trained with its own fitted label encoders, so the same
//! story has two integer encodings. Tables are validated when loaded: every
//! value the form can submit must have a code, which makes encoding a parsed
//! [`StoryAttributes`] infallible.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use crate::classifier::ModelFamily;
use crate::errors::{TierError, TierResult};
use crate::story::StoryAttributes;
use crate::vocabulary::Field;

/// One column as stored in the artifact: either the fitted class list
/// (code = position) or an explicit value to code map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Classes(Vec<String>),
    Codes(BTreeMap<String, i64>),
}

/// String to code mapping for one field.
#[derive(Debug, Clone)]
struct ColumnCodes {
    /// classes[code] = value
    classes: Vec<String>,
    /// code of each vocabulary entry, in display order
    by_vocabulary: Vec<i64>,
}

impl ColumnCodes {
    fn build(artifact: &str, field: Field, raw: RawColumn) -> TierResult<Self> {
        let classes = match raw {
            RawColumn::Classes(classes) => classes,
            RawColumn::Codes(codes) => {
                let mut slots: Vec<Option<String>> = vec![None; codes.len()];
                for (value, code) in codes {
                    let slot = usize::try_from(code)
                        .ok()
                        .and_then(|idx| slots.get_mut(idx))
                        .ok_or_else(|| {
                            TierError::encoder(
                                artifact,
                                format!("{field}: code {code} for '{value}' is outside 0..n"),
                            )
                        })?;
                    if slot.is_some() {
                        return Err(TierError::encoder(
                            artifact,
                            format!("{field}: code {code} assigned twice"),
                        ));
                    }
                    *slot = Some(value);
                }
                // n distinct codes in 0..n fill every slot
                slots.into_iter().flatten().collect()
            }
        };

        let mut positions: HashMap<&str, i64> = HashMap::with_capacity(classes.len());
        for (code, value) in classes.iter().enumerate() {
            if positions.insert(value.as_str(), code as i64).is_some() {
                return Err(TierError::encoder(
                    artifact,
                    format!("{field}: value '{value}' appears twice"),
                ));
            }
        }

        let mut missing = Vec::new();
        let mut by_vocabulary = Vec::with_capacity(field.vocabulary().len());
        for value in field.vocabulary() {
            match positions.get(value) {
                Some(code) => by_vocabulary.push(*code),
                None => missing.push(*value),
            }
        }
        if !missing.is_empty() {
            return Err(TierError::encoder(
                artifact,
                format!("{field}: no code for {}", missing.join(", ")),
            ));
        }

        if classes.len() > by_vocabulary.len() {
            debug!(
                artifact,
                field = field.column(),
                extra = classes.len() - by_vocabulary.len(),
                "encoder knows values the form never offers"
            );
        }

        Ok(Self {
            classes,
            by_vocabulary,
        })
    }
}

/// Immutable fitted encoder for one model family.
#[derive(Debug, Clone)]
pub struct EncodingTable {
    family: ModelFamily,
    columns: BTreeMap<Field, ColumnCodes>,
}

impl EncodingTable {
    /// Load and validate a JSON encoder artifact.
    pub fn load(path: impl AsRef<Path>, family: ModelFamily) -> TierResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierError::io(format!("reading encoder {}", path.display()), e))?;
        Self::from_json_str(&content, family, &path.display().to_string())
    }

    pub fn from_json_str(content: &str, family: ModelFamily, artifact: &str) -> TierResult<Self> {
        let raw: BTreeMap<String, RawColumn> = serde_json::from_str(content)
            .map_err(|e| TierError::encoder(artifact, format!("invalid JSON: {e}")))?;

        let mut columns = BTreeMap::new();
        for (column, table) in raw {
            match Field::from_column(&column) {
                Some(field) => {
                    columns.insert(field, ColumnCodes::build(artifact, field, table)?);
                }
                None => warn!(artifact, column = %column, "ignoring unknown encoder column"),
            }
        }

        let missing: Vec<&str> = Field::ALL
            .iter()
            .filter(|f| !columns.contains_key(*f))
            .map(|f| f.column())
            .collect();
        if !missing.is_empty() {
            return Err(TierError::encoder(
                artifact,
                format!("missing columns: {}", missing.join(", ")),
            ));
        }

        debug!(artifact, family = %family, "encoder table loaded");
        Ok(Self { family, columns })
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    fn column(&self, field: Field) -> &ColumnCodes {
        // presence of every field is checked when the table is built
        &self.columns[&field]
    }

    pub fn code(&self, field: Field, vocabulary_index: usize) -> i64 {
        self.column(field).by_vocabulary[vocabulary_index]
    }

    pub fn encode(&self, story: &StoryAttributes) -> EncodedRow {
        let codes = Field::ALL.map(|field| self.code(field, story.value_index(field)));
        EncodedRow {
            family: self.family,
            codes,
            popularity_ord: story.popularity_ord(),
        }
    }

    /// Reverse lookup of a code.
    pub fn decode(&self, field: Field, code: i64) -> Option<&str> {
        let idx = usize::try_from(code).ok()?;
        self.column(field).classes.get(idx).map(String::as_str)
    }

    /// Number of classes the encoder was fitted on for a field.
    pub fn cardinality(&self, field: Field) -> usize {
        self.column(field).classes.len()
    }
}

/// A story encoded for one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedRow {
    pub family: ModelFamily,
    /// Codes in [`Field::ALL`] order.
    pub codes: [i64; 6],
    /// Carried along, never fed to the models.
    pub popularity_ord: u8,
}

impl EncodedRow {
    pub fn code(&self, field: Field) -> i64 {
        self.codes[field as usize]
    }

    /// (input name, code) pairs as the models expect them.
    pub fn named_inputs(&self) -> Vec<(String, i64)> {
        Field::ALL
            .iter()
            .zip(self.codes)
            .map(|(field, code)| (field.input_name(), code))
            .collect()
    }
}

/// Both encodings of one story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedPair {
    pub model3: EncodedRow,
    pub model4: EncodedRow,
}

impl EncodedPair {
    pub fn for_family(&self, family: ModelFamily) -> &EncodedRow {
        match family {
            ModelFamily::Model3 => &self.model3,
            ModelFamily::Model4 => &self.model4,
        }
    }
}

/// The two fitted encoders side by side.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    model3: EncodingTable,
    model4: EncodingTable,
}

impl FeatureEncoder {
    pub fn new(model3: EncodingTable, model4: EncodingTable) -> TierResult<Self> {
        if model3.family() != ModelFamily::Model3 || model4.family() != ModelFamily::Model4 {
            return Err(TierError::internal("encoder tables passed for the wrong family"));
        }
        Ok(Self { model3, model4 })
    }

    pub fn load(model3_path: impl AsRef<Path>, model4_path: impl AsRef<Path>) -> TierResult<Self> {
        Self::new(
            EncodingTable::load(model3_path, ModelFamily::Model3)?,
            EncodingTable::load(model4_path, ModelFamily::Model4)?,
        )
    }

    pub fn table(&self, family: ModelFamily) -> &EncodingTable {
        match family {
            ModelFamily::Model3 => &self.model3,
            ModelFamily::Model4 => &self.model4,
        }
    }

    pub fn encode(&self, story: &StoryAttributes) -> EncodedPair {
        EncodedPair {
            model3: self.model3.encode(story),
            model4: self.model4.encode(story),
        }
    }
}

/// Class list in the layout a fitted label encoder produces: sorted values.
pub fn sorted_classes(field: Field) -> Vec<String> {
    let mut classes: Vec<String> = field.vocabulary().iter().map(|v| v.to_string()).collect();
    classes.sort();
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::sports_story;

    fn label_encoder_json(reverse: bool) -> String {
        let table: BTreeMap<&str, Vec<String>> = Field::ALL
            .iter()
            .map(|f| {
                let mut classes = sorted_classes(*f);
                if reverse {
                    classes.reverse();
                }
                (f.column(), classes)
            })
            .collect();
        serde_json::to_string(&table).unwrap()
    }

    #[test]
    fn every_vocabulary_value_round_trips() {
        let table =
            EncodingTable::from_json_str(&label_encoder_json(false), ModelFamily::Model3, "m3")
                .unwrap();
        for field in Field::ALL {
            for (idx, value) in field.vocabulary().iter().enumerate() {
                let code = table.code(field, idx);
                assert_eq!(table.decode(field, code), Some(*value));
            }
        }
    }

    #[test]
    fn families_encode_independently() {
        let m3 = EncodingTable::from_json_str(&label_encoder_json(false), ModelFamily::Model3, "m3")
            .unwrap();
        let m4 = EncodingTable::from_json_str(&label_encoder_json(true), ModelFamily::Model4, "m4")
            .unwrap();
        let encoder = FeatureEncoder::new(m3, m4).unwrap();

        let pair = encoder.encode(&sports_story());
        assert_eq!(pair.model3.family, ModelFamily::Model3);
        assert_eq!(pair.model4.family, ModelFamily::Model4);
        // popularity classes sorted: H, L, M
        assert_eq!(pair.model3.code(Field::PersonalityPopularity), 0);
        assert_eq!(pair.model4.code(Field::PersonalityPopularity), 2);
        assert_eq!(pair.model3.popularity_ord, 2);
        assert_ne!(pair.model3.codes, pair.model4.codes);
    }

    #[test]
    fn explicit_code_maps_are_accepted() {
        let mut table: BTreeMap<&str, serde_json::Value> = Field::ALL
            .iter()
            .map(|f| (f.column(), serde_json::json!(sorted_classes(*f))))
            .collect();
        table.insert(
            "Logistics",
            serde_json::json!({"BOTH": 0, "IN STUDIO": 1, "ON LOCATION": 2}),
        );
        let json = serde_json::to_string(&table).unwrap();
        let encoded = EncodingTable::from_json_str(&json, ModelFamily::Model3, "m3").unwrap();
        assert_eq!(encoded.code(Field::Logistics, 0), 2);
    }

    #[test]
    fn gaps_in_code_maps_are_rejected() {
        let mut table: BTreeMap<&str, serde_json::Value> = Field::ALL
            .iter()
            .map(|f| (f.column(), serde_json::json!(sorted_classes(*f))))
            .collect();
        table.insert(
            "Logistics",
            serde_json::json!({"BOTH": 0, "IN STUDIO": 1, "ON LOCATION": 3}),
        );
        let json = serde_json::to_string(&table).unwrap();
        let err = EncodingTable::from_json_str(&json, ModelFamily::Model3, "m3").unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn incomplete_vocabulary_is_rejected_at_load() {
        let mut table: BTreeMap<&str, Vec<String>> = Field::ALL
            .iter()
            .map(|f| (f.column(), sorted_classes(*f)))
            .collect();
        table
            .get_mut("Genre")
            .unwrap()
            .retain(|v| v != "SPORTS NEWS");
        let json = serde_json::to_string(&table).unwrap();
        let err = EncodingTable::from_json_str(&json, ModelFamily::Model4, "m4").unwrap_err();
        assert!(err.to_string().contains("SPORTS NEWS"));
    }

    #[test]
    fn missing_column_is_rejected() {
        let table: BTreeMap<&str, Vec<String>> = Field::ALL
            .iter()
            .filter(|f| **f != Field::StoryFormat)
            .map(|f| (f.column(), sorted_classes(*f)))
            .collect();
        let json = serde_json::to_string(&table).unwrap();
        let err = EncodingTable::from_json_str(&json, ModelFamily::Model3, "m3").unwrap_err();
        assert!(err.to_string().contains("Story_Format"));
    }

    #[test]
    fn extra_trained_values_are_tolerated() {
        let mut table: BTreeMap<&str, Vec<String>> = Field::ALL
            .iter()
            .map(|f| (f.column(), sorted_classes(*f)))
            .collect();
        table.get_mut("Geography").unwrap().push("ODISHA".into());
        let json = serde_json::to_string(&table).unwrap();
        let encoded = EncodingTable::from_json_str(&json, ModelFamily::Model3, "m3").unwrap();
        assert_eq!(encoded.cardinality(Field::Geography), 22);
        assert_eq!(encoded.decode(Field::Geography, 21), Some("ODISHA"));
        assert_eq!(encoded.decode(Field::Geography, 22), None);
        assert_eq!(encoded.decode(Field::Geography, -1), None);
    }

    #[test]
    fn wrong_family_order_is_rejected() {
        let json = label_encoder_json(false);
        let m3 = EncodingTable::from_json_str(&json, ModelFamily::Model3, "m3").unwrap();
        let m4 = EncodingTable::from_json_str(&json, ModelFamily::Model4, "m4").unwrap();
        assert!(FeatureEncoder::new(m4, m3).is_err());
    }
}
