use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ta_rs::{IndicatorConfig, compute_indicators};
use tracing::{info, warn};

use crate::bar;
use crate::config::{Config, LabelConfig};
use crate::data;
use crate::dataset::LabeledTable;
use crate::error::PipelineError;
use crate::label::{LabelSummary, barrier_outcomes, labels_from_outcomes};

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub raw_rows: usize,
    pub written_rows: usize,
    pub labels: LabelSummary,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub processed: Vec<SymbolReport>,
    pub skipped: Vec<String>,
}

/// The labeling and indicator settings a processed table was built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingManifest {
    pub symbol: String,
    pub label: LabelConfig,
    pub indicators: IndicatorConfig,
}

impl ProcessingManifest {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }

    /// `Ok(None)` when no manifest was written for the table.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
        let manifest = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        Ok(Some(manifest))
    }
}

/// Raw bars for `symbol` to a processed table: OHLCV, indicators and
/// `target`, restricted to rows with every indicator defined and a label.
pub fn process_symbol(config: &Config, symbol: &str) -> Result<SymbolReport> {
    let raw_path = config.raw_path(symbol);
    if !raw_path.exists() {
        return Err(PipelineError::MissingInputFile {
            symbol: symbol.to_string(),
            path: raw_path,
        }
        .into());
    }
    let bars = data::load_raw_bars(&raw_path)?;
    let closes = bar::closes(&bars);
    let frame = compute_indicators(&bar::to_price_series(&bars), &config.indicators);
    let outcomes = barrier_outcomes(&closes, &config.label);
    let labels = labels_from_outcomes(&outcomes);
    let summary = LabelSummary::from_outcomes(&outcomes);

    let table = LabeledTable::from_bars(&bars, &frame, labels)?;
    let eligible = table.filter_rows(|row| frame.is_row_defined(row) && table.labels()[row].is_some());

    let output = config.processed_path(symbol);
    data::write_processed(&output, &eligible)?;
    ProcessingManifest {
        symbol: symbol.to_string(),
        label: config.label,
        indicators: config.indicators.clone(),
    }
    .save(&config.manifest_path(symbol))?;
    info!(
        symbol,
        raw_rows = bars.len(),
        written_rows = eligible.len(),
        profit = summary.profit,
        stop = summary.stop,
        expired = summary.expired,
        unlabeled = summary.unlabeled,
        positive_rate = summary.positive_rate(),
        path = %output.display(),
        "processed symbol"
    );
    Ok(SymbolReport {
        symbol: symbol.to_string(),
        raw_rows: bars.len(),
        written_rows: eligible.len(),
        labels: summary,
        output,
    })
}

/// Process every watchlist symbol. Symbols without a raw file are skipped
/// with a warning; any other failure aborts the run.
pub fn process_watchlist(config: &Config) -> Result<ProcessSummary> {
    fs::create_dir_all(&config.processed_dir)
        .with_context(|| format!("Unable to create {}", config.processed_dir.display()))?;
    let mut summary = ProcessSummary::default();
    for symbol in &config.watchlist {
        match process_symbol(config, symbol) {
            Ok(report) => summary.processed.push(report),
            Err(err) => {
                if let Some(missing @ PipelineError::MissingInputFile { .. }) =
                    err.downcast_ref::<PipelineError>()
                {
                    warn!(symbol = %symbol, "{missing}; skipping");
                    summary.skipped.push(symbol.clone());
                    continue;
                }
                return Err(err.context(format!("Failed to process {symbol}")));
            }
        }
    }
    info!(
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        "watchlist processing complete"
    );
    Ok(summary)
}
