use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ta_rs::IndicatorConfig;

use crate::config::LabelConfig;
use crate::error::PipelineError;
use crate::gbm::GbmClassifier;
use crate::metrics::ClassificationReport;
use crate::schema::FeatureSchema;
use crate::search::CandidateScore;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Everything produced by one training run. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub format_version: u32,
    pub symbol: String,
    pub trained_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    pub schema_fingerprint: String,
    pub model: GbmClassifier,
    pub best: CandidateScore,
    pub report: ClassificationReport,
    /// Sorted by importance, highest first.
    pub feature_importances: Vec<FeatureImportance>,
    /// Label settings of the processing run; `None` when they were not recorded.
    #[serde(default)]
    pub label: Option<LabelConfig>,
    pub indicators: IndicatorConfig,
    pub dataset_sha256: String,
}

impl TrainedArtifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to serialize model to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        Ok(())
    }

    /// Read and validate an artifact. A missing file is reported as
    /// [`PipelineError::MissingModelArtifact`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingModelArtifact {
                path: path.to_path_buf(),
            }
            .into());
        }
        let file = File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
        let artifact: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model artifact {}", path.display()))?;
        artifact
            .validate()
            .with_context(|| format!("Rejected model artifact {}", path.display()))?;
        Ok(artifact)
    }

    /// The schema must match its recorded fingerprint and the model width,
    /// and its slots must be indicators the recorded config produces, in
    /// emission order.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.format_version == ARTIFACT_FORMAT_VERSION,
            "unsupported artifact format version {}",
            self.format_version
        );
        self.model.validate()?;
        if self.schema.fingerprint() != self.schema_fingerprint {
            return Err(PipelineError::SchemaMismatch(
                "feature list does not match its recorded fingerprint".into(),
            )
            .into());
        }
        if self.schema.width() != self.model.n_features() {
            return Err(PipelineError::SchemaMismatch(format!(
                "schema lists {} features but model expects {}",
                self.schema.width(),
                self.model.n_features()
            ))
            .into());
        }
        let produced = self.indicators.column_names();
        if let Some(missing) = self.schema.names().find(|name| !produced.iter().any(|p| p == name)) {
            return Err(PipelineError::SchemaMismatch(format!(
                "feature '{missing}' is not produced by the recorded indicator config"
            ))
            .into());
        }
        // Slots keep the order the indicator engine emits them in.
        let expected = FeatureSchema::new(
            produced
                .into_iter()
                .filter(|name| self.schema.names().any(|slot| slot == name.as_str())),
        )?;
        expected.ensure_matches(&self.schema)
    }
}

pub fn rank_importances(schema: &FeatureSchema, model: &GbmClassifier) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = schema
        .names()
        .zip(model.feature_importances())
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.to_string(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}
