use std::path::PathBuf;

use thiserror::Error;

/// Failure classes callers need to tell apart. These travel inside
/// `anyhow::Error`; use `downcast_ref::<PipelineError>()` to classify.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing input file for {symbol}: {}", path.display())]
    MissingInputFile { symbol: String, path: PathBuf },

    #[error("model artifact not found at {}", path.display())]
    MissingModelArtifact { path: PathBuf },

    #[error("insufficient history: {available} bars supplied, at least {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error("training partition is empty after cleaning ({rows} labeled rows available)")]
    EmptyTrainingSet { rows: usize },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid bar sequence: {0}")]
    InvalidBars(String),
}
