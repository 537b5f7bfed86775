use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use sha2::{Digest, Sha256};
use ta_rs::PriceSeries;
use tracing::warn;

use crate::bar::{self, Bar};
use crate::dataset::LabeledTable;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const TARGET_COLUMN: &str = "target";
pub const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

const TIMESTAMP_ALIASES: [&str; 4] = ["timestamp", "date", "datetime", "time"];

/// Load a raw daily OHLCV CSV. Column names are matched case-insensitively;
/// the date column may be called `timestamp`, `date`, `datetime` or `time`,
/// and otherwise the first column is taken as the date index. Rows whose
/// date does not parse (the `Ticker`/`Date` preamble of a multi-row header)
/// or that miss a price or volume are dropped.
pub fn load_raw_bars(path: &Path) -> Result<Vec<Bar>> {
    let df = read_csv(path)?;

    let timestamp_name = match find_column(&df, &TIMESTAMP_ALIASES) {
        Some(name) => name,
        None => df
            .get_column_names()
            .first()
            .map(|name| name.to_string())
            .with_context(|| format!("{} has no columns", path.display()))?,
    };
    let timestamps = timestamp_values(&df, &timestamp_name, DateParsing::SkipInvalid)?;

    let mut price_columns = Vec::with_capacity(PRICE_COLUMNS.len());
    for name in PRICE_COLUMNS {
        let actual = find_column(&df, &[name])
            .with_context(|| format!("{} is missing required column '{name}'", path.display()))?;
        price_columns.push(float_column(&df, &actual)?);
    }

    let mut prices = PriceSeries::with_capacity(df.height());
    let mut kept_timestamps = Vec::with_capacity(df.height());
    let mut undated = 0usize;
    let mut incomplete = 0usize;
    for (row, timestamp) in timestamps.into_iter().enumerate() {
        let values: Vec<f64> = price_columns.iter().map(|column| column[row]).collect();
        let Some(ts) = timestamp else {
            undated += 1;
            continue;
        };
        if !values.iter().all(|value| value.is_finite()) {
            incomplete += 1;
            continue;
        }
        prices.push(values[0], values[1], values[2], values[3], values[4]);
        kept_timestamps.push(ts);
    }
    if undated + incomplete > 0 {
        warn!(
            path = %path.display(),
            undated,
            incomplete,
            "dropped raw rows without a date or with missing values"
        );
    }

    bar::from_columns(&kept_timestamps, &prices)
        .with_context(|| format!("Invalid bar data in {}", path.display()))
}

/// Persist a labeled table as CSV: `timestamp` (RFC 3339), the table's float
/// columns in their stored order, then `target`.
pub fn write_processed(path: &Path, table: &LabeledTable) -> Result<()> {
    let mut columns = Vec::with_capacity(table.columns().len() + 2);
    let timestamps: Vec<String> = table
        .timestamps()
        .iter()
        .map(|ts| ts.to_rfc3339())
        .collect();
    columns.push(Series::new(TIMESTAMP_COLUMN, timestamps));
    for (name, values) in table.columns() {
        let values: Vec<Option<f64>> = values
            .iter()
            .map(|value| value.is_finite().then_some(*value))
            .collect();
        columns.push(Series::new(name.as_str(), values));
    }
    let targets: Vec<Option<i32>> = table
        .labels()
        .iter()
        .map(|label| label.map(i32::from))
        .collect();
    columns.push(Series::new(TARGET_COLUMN, targets));

    let mut df = DataFrame::new(columns).context("Failed to assemble processed frame")?;
    let mut file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write processed data to {}", path.display()))?;
    Ok(())
}

/// Read a processed table written by [`write_processed`]. Every column other
/// than `timestamp` and `target` is loaded as a float feature column.
pub fn read_processed(path: &Path) -> Result<LabeledTable> {
    let df = read_csv(path)?;
    let timestamps = timestamp_values(&df, TIMESTAMP_COLUMN, DateParsing::Strict)?
        .into_iter()
        .enumerate()
        .map(|(row, ts)| ts.ok_or_else(|| anyhow!("row {row} has no timestamp")))
        .collect::<Result<Vec<DateTime<Utc>>>>()
        .with_context(|| format!("Invalid timestamps in {}", path.display()))?;

    let labels = match df.column(TARGET_COLUMN) {
        Ok(_) => float_column(&df, TARGET_COLUMN)?
            .into_iter()
            .map(label_from_float)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid target column in {}", path.display()))?,
        Err(_) => vec![None; df.height()],
    };

    let mut table = LabeledTable::new(timestamps, labels)?;
    for name in df.get_column_names() {
        if name == TIMESTAMP_COLUMN || name == TARGET_COLUMN {
            continue;
        }
        table.push_column(name, float_column(&df, name)?)?;
    }
    Ok(table)
}

fn label_from_float(value: f64) -> Result<Option<u8>> {
    if value.is_nan() {
        Ok(None)
    } else if value == 0.0 {
        Ok(Some(0))
    } else if value == 1.0 {
        Ok(Some(1))
    } else {
        Err(anyhow!("target value {value} is not 0 or 1"))
    }
}

/// Hex SHA-256 of a file's bytes.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Unable to open {} for fingerprinting", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReader::from_path(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .infer_schema(Some(1024))
        .has_header(true)
        .finish()
        .with_context(|| format!("Unable to read {} into DataFrame", path.display()))
}

fn find_column(df: &DataFrame, candidates: &[&str]) -> Option<String> {
    let names = df.get_column_names();
    candidates.iter().find_map(|candidate| {
        names
            .iter()
            .find(|name| name.trim().eq_ignore_ascii_case(candidate))
            .map(|name| name.to_string())
    })
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column {name} must be numeric"))?;
    Ok(series
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateParsing {
    Strict,
    /// Unparseable entries become `None` instead of failing the load.
    SkipInvalid,
}

fn timestamp_values(
    df: &DataFrame,
    name: &str,
    parsing: DateParsing,
) -> Result<Vec<Option<DateTime<Utc>>>> {
    let series = df
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    let mut out = Vec::with_capacity(series.len());
    for value in series.iter() {
        let raw = match value {
            AnyValue::String(s) => s,
            AnyValue::StringOwned(ref s) => s.as_str(),
            AnyValue::Null => {
                out.push(None);
                continue;
            }
            other => {
                return Err(anyhow!(
                    "Timestamp column '{name}' must hold date strings (got {:?})",
                    other.dtype()
                ));
            }
        };
        match (bar::parse_timestamp(raw), parsing) {
            (Ok(ts), _) => out.push(Some(ts)),
            (Err(_), DateParsing::SkipInvalid) => out.push(None),
            (Err(err), DateParsing::Strict) => return Err(err),
        }
    }
    Ok(out)
}
