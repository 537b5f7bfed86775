use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::artifact::{ARTIFACT_FORMAT_VERSION, TrainedArtifact, rank_importances};
use crate::config::Config;
use crate::data;
use crate::dataset::{ClassCounts, build_dataset};
use crate::error::PipelineError;
use crate::metrics::ClassificationReport;
use crate::process::ProcessingManifest;
use crate::schema::FeatureSchema;
use crate::search::{CandidateScore, grid_search};

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: TrainedArtifact,
    pub model_path: PathBuf,
    pub candidates: Vec<CandidateScore>,
    pub train_counts_before: ClassCounts,
    pub train_counts: ClassCounts,
    pub test_counts: ClassCounts,
}

/// Train on the configured symbol's processed table and persist the winner.
pub fn train(config: &Config) -> Result<TrainingOutcome> {
    let symbol = config.training_symbol.as_str();
    let input = config.processed_path(symbol);
    if !input.exists() {
        return Err(PipelineError::MissingInputFile {
            symbol: symbol.to_string(),
            path: input,
        }
        .into());
    }
    let table = data::read_processed(&input)?;
    let dataset_sha256 = data::sha256_file(&input)?;
    info!(symbol, rows = table.len(), path = %input.display(), "loaded processed data");

    // Features and the recorded label settings come from the run that wrote
    // the table, not from this invocation.
    let (label, indicators) = match ProcessingManifest::load(&config.manifest_path(symbol))? {
        Some(manifest) => {
            if manifest.label != config.label || manifest.indicators != config.indicators {
                info!(symbol, "using label and indicator settings recorded at processing time");
            }
            (Some(manifest.label), manifest.indicators)
        }
        None => {
            warn!(symbol, "no processing manifest; label settings will not be recorded");
            (None, config.indicators.clone())
        }
    };

    let schema = FeatureSchema::for_indicators(&indicators)?;
    let split = build_dataset(&table, &schema, &config.split, &config.oversample)?;

    let search = grid_search(&split.x_train, &split.y_train, &config.search)?;
    let predicted = search.model.predict_batch(&split.x_test)?;
    let report = ClassificationReport::new(&split.y_test, &predicted);
    info!(
        test_rows = split.y_test.len(),
        accuracy = report.accuracy,
        positive_f1 = report.classes[1].f1,
        "held-out evaluation complete"
    );

    let feature_importances = rank_importances(&schema, &search.model);
    for (rank, entry) in feature_importances.iter().take(5).enumerate() {
        info!(rank = rank + 1, feature = %entry.feature, importance = entry.importance, "feature importance");
    }

    let artifact = TrainedArtifact {
        format_version: ARTIFACT_FORMAT_VERSION,
        symbol: symbol.to_string(),
        trained_at: Utc::now(),
        schema_fingerprint: schema.fingerprint(),
        schema,
        model: search.model,
        best: search.best,
        report,
        feature_importances,
        label,
        indicators,
        dataset_sha256,
    };
    let model_path = config.model_path();
    artifact
        .save(&model_path)
        .with_context(|| format!("Failed to persist model for {symbol}"))?;
    info!(path = %model_path.display(), "model saved");

    Ok(TrainingOutcome {
        artifact,
        model_path,
        candidates: search.scores,
        train_counts_before: split.train_counts_before,
        train_counts: split.train_counts,
        test_counts: split.test_counts,
    })
}
