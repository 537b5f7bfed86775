use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ta_rs::{IndicatorConfig, IndicatorFrame};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSlot {
    pub name: String,
    pub kind: FeatureKind,
}

/// Anything that can hand out a float column by name.
pub trait NamedColumns {
    fn named_column(&self, name: &str) -> Option<&[f64]>;
}

impl NamedColumns for IndicatorFrame {
    fn named_column(&self, name: &str) -> Option<&[f64]> {
        self.column(name)
    }
}

/// Ordered list of model inputs. Position `i` of every feature vector holds
/// the slot named at position `i`; vectors are always assembled by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    slots: Vec<FeatureSlot>,
}

impl FeatureSchema {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots: Vec<FeatureSlot> = names
            .into_iter()
            .map(|name| FeatureSlot {
                name: name.into(),
                kind: FeatureKind::Continuous,
            })
            .collect();
        if slots.is_empty() {
            return Err(PipelineError::SchemaMismatch("schema has no features".into()).into());
        }
        for (idx, slot) in slots.iter().enumerate() {
            if slots[..idx].iter().any(|other| other.name == slot.name) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "feature '{}' declared twice",
                    slot.name
                ))
                .into());
            }
        }
        Ok(Self { slots })
    }

    /// One slot per indicator column, in emission order.
    pub fn for_indicators(config: &IndicatorConfig) -> Result<Self> {
        Self::new(config.column_names())
    }

    pub fn slots(&self) -> &[FeatureSlot] {
        &self.slots
    }

    pub fn names(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Stable hex digest of the ordered slot list.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for slot in &self.slots {
            hasher.update(slot.name.as_bytes());
            hasher.update(b":");
            hasher.update(format!("{:?}", slot.kind).as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Reject any difference in names or order.
    pub fn ensure_matches(&self, other: &FeatureSchema) -> Result<()> {
        if self.slots == other.slots {
            return Ok(());
        }
        let first_diff = self
            .slots
            .iter()
            .zip(other.slots.iter())
            .position(|(a, b)| a != b);
        let detail = match first_diff {
            Some(idx) => format!(
                "slot {idx} is '{}' but expected '{}'",
                other.slots[idx].name, self.slots[idx].name
            ),
            None => format!(
                "width {} but expected {}",
                other.slots.len(),
                self.slots.len()
            ),
        };
        Err(PipelineError::SchemaMismatch(detail).into())
    }

    /// Resolve every slot against `source`, failing on the first missing name.
    pub fn resolve<'a, C: NamedColumns + ?Sized>(&self, source: &'a C) -> Result<Vec<&'a [f64]>> {
        self.slots
            .iter()
            .map(|slot| {
                source.named_column(&slot.name).ok_or_else(|| {
                    anyhow::Error::from(PipelineError::SchemaMismatch(format!(
                        "missing feature column '{}'",
                        slot.name
                    )))
                })
            })
            .collect()
    }

    /// Feature vector for `row`, in schema order.
    pub fn row<C: NamedColumns + ?Sized>(&self, source: &C, row: usize) -> Result<Vec<f64>> {
        let columns = self.resolve(source)?;
        Ok(gather_row(&columns, row))
    }
}

pub(crate) fn gather_row(columns: &[&[f64]], row: usize) -> Vec<f64> {
    columns.iter().map(|column| column[row]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapColumns(HashMap<String, Vec<f64>>);

    impl NamedColumns for MapColumns {
        fn named_column(&self, name: &str) -> Option<&[f64]> {
            self.0.get(name).map(Vec::as_slice)
        }
    }

    #[test]
    fn default_schema_has_sixteen_indicators() {
        let schema = FeatureSchema::for_indicators(&IndicatorConfig::default()).unwrap();
        assert_eq!(schema.width(), 16);
        assert_eq!(schema.names().next(), Some("sma_10"));
        assert_eq!(schema.names().last(), Some("macds_12_26_9"));
    }

    #[test]
    fn rows_follow_schema_order_not_source_order() {
        let schema = FeatureSchema::new(["b", "a"]).unwrap();
        let mut columns = HashMap::new();
        columns.insert("a".to_string(), vec![1.0, 2.0]);
        columns.insert("b".to_string(), vec![10.0, 20.0]);
        columns.insert("ignored".to_string(), vec![0.0, 0.0]);
        let row = schema.row(&MapColumns(columns), 1).unwrap();
        assert_eq!(row, vec![20.0, 2.0]);
    }

    #[test]
    fn missing_column_is_schema_mismatch() {
        let schema = FeatureSchema::new(["a", "z"]).unwrap();
        let mut columns = HashMap::new();
        columns.insert("a".to_string(), vec![1.0]);
        let err = schema.row(&MapColumns(columns), 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn reordered_schema_is_rejected_and_fingerprint_changes() {
        let a = FeatureSchema::new(["x", "y"]).unwrap();
        let b = FeatureSchema::new(["y", "x"]).unwrap();
        assert!(a.ensure_matches(&a.clone()).is_ok());
        assert!(a.ensure_matches(&b).is_err());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(FeatureSchema::new(["x", "x"]).is_err());
        assert!(FeatureSchema::new(Vec::<String>::new()).is_err());
    }
}
