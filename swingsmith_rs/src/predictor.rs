//! Single-bar inference from a window of recent raw bars.
//!
//! Missing models and windows too short to define every indicator produce
//! the neutral signal `0` rather than an error. Unparseable input is fatal.

use std::fmt;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use ta_rs::compute_indicators;
use tracing::{info, warn};

use crate::artifact::TrainedArtifact;
use crate::bar::{self, Bar};
use crate::error::PipelineError;
use crate::schema::NamedColumns;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    Model,
    MissingModel,
    InsufficientHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub class: u8,
    pub reason: SignalReason,
}

impl Signal {
    pub fn neutral(reason: SignalReason) -> Self {
        Self { class: 0, reason }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class)
    }
}

/// Read the whole payload once, then predict.
pub fn predict_from_reader<R: Read>(mut reader: R, model_path: &Path) -> Result<Signal> {
    let mut payload = String::new();
    reader
        .read_to_string(&mut payload)
        .map_err(|err| PipelineError::MalformedInput(format!("unreadable input: {err}")))?;
    let bars = bar::bars_from_json(&payload)?;
    predict_bars(bars, model_path)
}

pub fn predict_bars(bars: Vec<Bar>, model_path: &Path) -> Result<Signal> {
    let bars = bar::into_ordered(bars)?;
    let artifact = match TrainedArtifact::load(model_path) {
        Ok(artifact) => artifact,
        Err(err) => {
            if let Some(missing @ PipelineError::MissingModelArtifact { .. }) =
                err.downcast_ref::<PipelineError>()
            {
                warn!("{missing}; emitting neutral signal");
                return Ok(Signal::neutral(SignalReason::MissingModel));
            }
            return Err(err);
        }
    };
    predict_with_artifact(&artifact, &bars)
}

/// Features for the most recent fully defined bar, assembled by name in the
/// artifact's schema order.
pub fn predict_with_artifact(artifact: &TrainedArtifact, bars: &[Bar]) -> Result<Signal> {
    let frame = compute_indicators(&bar::to_price_series(bars), &artifact.indicators);
    let Some(row) = frame.last_defined_row() else {
        let shortfall = PipelineError::InsufficientHistory {
            available: bars.len(),
            required: artifact.indicators.min_bars(),
        };
        warn!("{shortfall}; emitting neutral signal");
        return Ok(Signal::neutral(SignalReason::InsufficientHistory));
    };
    predict_row(artifact, &frame, row).map(|class| {
        info!(
            class,
            bar = %bars[row].timestamp.to_rfc3339(),
            "prediction made"
        );
        Signal {
            class,
            reason: SignalReason::Model,
        }
    })
}

/// Class for `row` of any named-column source. Column order in `source` is
/// irrelevant.
pub fn predict_row<C: NamedColumns + ?Sized>(
    artifact: &TrainedArtifact,
    source: &C,
    row: usize,
) -> Result<u8> {
    let features = artifact
        .schema
        .row(source, row)
        .context("Failed to assemble inference features")?;
    artifact.model.predict(&features)
}
