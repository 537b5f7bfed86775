//! Technical indicator engine for daily OHLCV series.
//!
//! `compute_indicators` turns a [`PriceSeries`] into an [`IndicatorFrame`]:
//! one named column per indicator, row-aligned with the input. Rows inside an
//! indicator's warm-up window hold `NaN` and must be treated as missing.

mod math;

use serde::{Deserialize, Serialize};

/// Column-oriented OHLCV input. All vectors share one length and are ordered
/// oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            open: Vec::with_capacity(capacity),
            high: Vec::with_capacity(capacity),
            low: Vec::with_capacity(capacity),
            close: Vec::with_capacity(capacity),
            volume: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) {
        self.open.push(open);
        self.high.push(high);
        self.low.push(low);
        self.close.push(close);
        self.volume.push(volume);
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Lookback settings for every indicator the engine emits. Column names are
/// derived from these values, so two configs with different periods never
/// produce colliding names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_fast: 10,
            sma_slow: 50,
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            bb_period: 5,
            bb_std: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    /// Names of every emitted column, in emission order.
    pub fn column_names(&self) -> Vec<String> {
        let bb = format!("{}_{}", self.bb_period, self.bb_std);
        let macd = format!("{}_{}_{}", self.macd_fast, self.macd_slow, self.macd_signal);
        vec![
            format!("sma_{}", self.sma_fast),
            format!("sma_{}", self.sma_slow),
            format!("rsi_{}", self.rsi_period),
            format!("atr_{}", self.atr_period),
            "obv".to_string(),
            format!("adx_{}", self.adx_period),
            format!("dmp_{}", self.adx_period),
            format!("dmn_{}", self.adx_period),
            format!("bbl_{bb}"),
            format!("bbm_{bb}"),
            format!("bbu_{bb}"),
            format!("bbb_{bb}"),
            format!("bbp_{bb}"),
            format!("macd_{macd}"),
            format!("macdh_{macd}"),
            format!("macds_{macd}"),
        ]
    }

    /// Number of leading rows that stay undefined in at least one column.
    pub fn warmup_rows(&self) -> usize {
        let sma = self.sma_fast.max(self.sma_slow).saturating_sub(1);
        let bb = self.bb_period.saturating_sub(1);
        let adx = (2 * self.adx_period).saturating_sub(1);
        let macd_line = self.macd_fast.max(self.macd_slow).saturating_sub(1);
        let macd_signal = macd_line + self.macd_signal.saturating_sub(1);
        [sma, self.rsi_period, self.atr_period, adx, bb, macd_signal]
            .into_iter()
            .max()
            .unwrap_or(0)
    }

    /// Shortest series that yields at least one fully defined row.
    pub fn min_bars(&self) -> usize {
        self.warmup_rows() + 1
    }
}

/// Indicator output: named columns aligned row-for-row with the input series.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    len: usize,
    columns: Vec<(String, Vec<f64>)>,
}

impl IndicatorFrame {
    fn new(len: usize) -> Self {
        Self {
            len,
            columns: Vec::new(),
        }
    }

    fn insert(&mut self, name: String, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.len);
        self.columns.push((name, values));
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// True when every column holds a finite value at `row`.
    pub fn is_row_defined(&self, row: usize) -> bool {
        row < self.len && self.columns.iter().all(|(_, values)| values[row].is_finite())
    }

    /// Index of the most recent fully defined row.
    pub fn last_defined_row(&self) -> Option<usize> {
        (0..self.len).rev().find(|&row| self.is_row_defined(row))
    }
}

/// Compute the full indicator set over `prices`.
pub fn compute_indicators(prices: &PriceSeries, config: &IndicatorConfig) -> IndicatorFrame {
    let len = prices.len();
    let mut frame = IndicatorFrame::new(len);
    let mut names = config.column_names().into_iter();
    let mut next_name = || names.next().unwrap_or_default();

    frame.insert(next_name(), math::sma(&prices.close, config.sma_fast));
    frame.insert(next_name(), math::sma(&prices.close, config.sma_slow));
    frame.insert(next_name(), math::rsi(&prices.close, config.rsi_period));
    frame.insert(
        next_name(),
        math::atr(&prices.high, &prices.low, &prices.close, config.atr_period),
    );
    frame.insert(next_name(), math::obv(&prices.close, &prices.volume));

    let directional = math::adx(&prices.high, &prices.low, &prices.close, config.adx_period);
    frame.insert(next_name(), directional.adx);
    frame.insert(next_name(), directional.plus_di);
    frame.insert(next_name(), directional.minus_di);

    let bands = math::bollinger(&prices.close, config.bb_period, config.bb_std);
    frame.insert(next_name(), bands.lower);
    frame.insert(next_name(), bands.middle);
    frame.insert(next_name(), bands.upper);
    frame.insert(next_name(), bands.bandwidth);
    frame.insert(next_name(), bands.percent);

    let macd = math::macd(
        &prices.close,
        config.macd_fast,
        config.macd_slow,
        config.macd_signal,
    );
    frame.insert(next_name(), macd.line);
    frame.insert(next_name(), macd.histogram);
    frame.insert(next_name(), macd.signal);

    frame
}
