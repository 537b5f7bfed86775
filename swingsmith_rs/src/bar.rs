use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ta_rs::PriceSeries;

use crate::error::PipelineError;

/// One trading day of OHLCV data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|value| value.is_finite())
    }
}

/// Timestamp as it arrives on the wire: a date string or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Text(String),
    EpochMillis(i64),
}

/// Compact bar shape used on the inference wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawBar {
    pub t: RawTimestamp,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl RawBar {
    pub fn into_bar(self) -> Result<Bar> {
        let timestamp = match self.t {
            RawTimestamp::Text(raw) => parse_timestamp(&raw)?,
            RawTimestamp::EpochMillis(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| anyhow!("epoch timestamp {ms} is out of range"))?,
        };
        Ok(Bar {
            timestamp,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        })
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and plain
/// `YYYY-MM-DD`. Naive values are taken as UTC; dates as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(anyhow!("unrecognised timestamp '{raw}'"))
}

/// Parse the inference payload: a JSON array of `{t, o, h, l, c, v}` objects.
/// Any parse failure is reported as [`PipelineError::MalformedInput`].
pub fn bars_from_json(payload: &str) -> Result<Vec<Bar>> {
    let raw: Vec<RawBar> = serde_json::from_str(payload)
        .map_err(|err| PipelineError::MalformedInput(err.to_string()))?;
    raw.into_iter()
        .enumerate()
        .map(|(idx, bar)| {
            bar.into_bar().map_err(|err| {
                anyhow::Error::from(PipelineError::MalformedInput(format!("bar {idx}: {err}")))
            })
        })
        .collect()
}

/// Sort bars oldest first and enforce the sequence invariants: unique
/// timestamps and finite prices and volume.
pub fn into_ordered(mut bars: Vec<Bar>) -> Result<Vec<Bar>> {
    bars.sort_by_key(|bar| bar.timestamp);
    for pair in bars.windows(2) {
        if pair[0].timestamp == pair[1].timestamp {
            return Err(PipelineError::InvalidBars(format!(
                "duplicate timestamp {}",
                pair[0].timestamp.to_rfc3339()
            ))
            .into());
        }
    }
    if let Some(bad) = bars.iter().find(|bar| !bar.is_finite()) {
        return Err(PipelineError::InvalidBars(format!(
            "non-finite value in bar at {}",
            bad.timestamp.to_rfc3339()
        ))
        .into());
    }
    Ok(bars)
}

pub fn to_price_series(bars: &[Bar]) -> PriceSeries {
    let mut prices = PriceSeries::with_capacity(bars.len());
    for bar in bars {
        prices.push(bar.open, bar.high, bar.low, bar.close, bar.volume);
    }
    prices
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|bar| bar.close).collect()
}

/// Build bars from parallel columns, as read from a table.
pub fn from_columns(timestamps: &[DateTime<Utc>], prices: &PriceSeries) -> Result<Vec<Bar>> {
    if timestamps.len() != prices.len() {
        return Err(anyhow!(
            "timestamp column has {} rows but price columns have {}",
            timestamps.len(),
            prices.len()
        ));
    }
    let bars = timestamps
        .iter()
        .enumerate()
        .map(|(idx, &timestamp)| Bar {
            timestamp,
            open: prices.open[idx],
            high: prices.high[idx],
            low: prices.low[idx],
            close: prices.close[idx],
            volume: prices.volume[idx],
        })
        .collect();
    into_ordered(bars).context("raw bar table violates ordering invariants")
}
