use anyhow::{Result, anyhow, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ta_rs::IndicatorFrame;
use tracing::info;

use crate::bar::Bar;
use crate::config::{OversampleConfig, SplitConfig};
use crate::error::PipelineError;
use crate::oversample::{self, Resampled};
use crate::schema::{FeatureSchema, NamedColumns, gather_row};

/// Time-indexed table of float columns with an optional binary label per row.
#[derive(Debug, Clone, Default)]
pub struct LabeledTable {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<(String, Vec<f64>)>,
    labels: Vec<Option<u8>>,
}

impl LabeledTable {
    pub fn new(timestamps: Vec<DateTime<Utc>>, labels: Vec<Option<u8>>) -> Result<Self> {
        ensure!(
            timestamps.len() == labels.len(),
            "{} timestamps but {} labels",
            timestamps.len(),
            labels.len()
        );
        Ok(Self {
            timestamps,
            columns: Vec::new(),
            labels,
        })
    }

    /// OHLCV plus every indicator column, aligned to `bars`.
    pub fn from_bars(bars: &[Bar], frame: &IndicatorFrame, labels: Vec<Option<u8>>) -> Result<Self> {
        ensure!(
            frame.len() == bars.len(),
            "indicator frame has {} rows for {} bars",
            frame.len(),
            bars.len()
        );
        let mut table = Self::new(bars.iter().map(|bar| bar.timestamp).collect(), labels)?;
        table.push_column("open", bars.iter().map(|bar| bar.open).collect())?;
        table.push_column("high", bars.iter().map(|bar| bar.high).collect())?;
        table.push_column("low", bars.iter().map(|bar| bar.low).collect())?;
        table.push_column("close", bars.iter().map(|bar| bar.close).collect())?;
        table.push_column("volume", bars.iter().map(|bar| bar.volume).collect())?;
        for (name, values) in frame.columns() {
            table.push_column(name, values.to_vec())?;
        }
        Ok(table)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        ensure!(
            values.len() == self.len(),
            "column '{name}' has {} rows, table has {}",
            values.len(),
            self.len()
        );
        ensure!(self.column(&name).is_none(), "duplicate column '{name}'");
        self.columns.push((name, values));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn labels(&self) -> &[Option<u8>] {
        &self.labels
    }

    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Copy of the rows for which `keep(row)` holds, order preserved.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let rows: Vec<usize> = (0..self.len()).filter(|&row| keep(row)).collect();
        Self {
            timestamps: rows.iter().map(|&row| self.timestamps[row]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), rows.iter().map(|&row| values[row]).collect()))
                .collect(),
            labels: rows.iter().map(|&row| self.labels[row]).collect(),
        }
    }
}

impl NamedColumns for LabeledTable {
    fn named_column(&self, name: &str) -> Option<&[f64]> {
        self.column(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub negative: usize,
    pub positive: usize,
}

impl ClassCounts {
    pub fn from_labels(labels: &[u8]) -> Self {
        let positive = labels.iter().filter(|&&label| label == 1).count();
        Self {
            negative: labels.len() - positive,
            positive,
        }
    }

    pub fn total(&self) -> usize {
        self.negative + self.positive
    }

    pub fn is_balanced(&self) -> bool {
        self.negative == self.positive
    }
}

/// Model-ready partitions. Training rows strictly precede test rows in time;
/// only the training side may contain synthetic rows, appended after the
/// originals.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub schema: FeatureSchema,
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<u8>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<u8>,
    pub train_timestamps: Vec<DateTime<Utc>>,
    pub test_timestamps: Vec<DateTime<Utc>>,
    pub train_counts_before: ClassCounts,
    pub train_counts: ClassCounts,
    pub test_counts: ClassCounts,
    pub dropped_rows: usize,
    pub synthetic_rows: usize,
}

/// Number of rows held out for `n` cleaned rows; rounds up.
pub fn test_rows(n: usize, test_size: f64) -> usize {
    ((n as f64 * test_size).ceil() as usize).min(n)
}

/// Select schema columns, drop incomplete rows, split chronologically, then
/// oversample the training partition.
pub fn build_dataset(
    table: &LabeledTable,
    schema: &FeatureSchema,
    split: &SplitConfig,
    oversample_config: &OversampleConfig,
) -> Result<DatasetSplit> {
    if !(0.0..1.0).contains(&split.test_size) {
        return Err(anyhow!(
            "test_size must be in [0, 1), got {}",
            split.test_size
        ));
    }
    let columns = schema.resolve(table)?;

    let mut rows = Vec::with_capacity(table.len());
    let mut labels = Vec::with_capacity(table.len());
    let mut timestamps = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let Some(label) = table.labels()[row] else {
            continue;
        };
        let features = gather_row(&columns, row);
        if features.iter().all(|value| value.is_finite()) {
            rows.push(features);
            labels.push(label);
            timestamps.push(table.timestamps()[row]);
        }
    }
    let dropped_rows = table.len() - rows.len();

    let n = rows.len();
    let n_test = test_rows(n, split.test_size);
    let n_train = n - n_test;
    if n_train == 0 {
        return Err(PipelineError::EmptyTrainingSet { rows: n }.into());
    }

    let x_test = rows.split_off(n_train);
    let y_test = labels.split_off(n_train);
    let test_timestamps = timestamps.split_off(n_train);
    let train_counts_before = ClassCounts::from_labels(&labels);

    let Resampled {
        x: x_train,
        y: y_train,
        synthetic,
    } = if oversample_config.enabled {
        oversample::smote(&rows, &labels, oversample_config)?
    } else {
        Resampled {
            x: rows,
            y: labels,
            synthetic: 0,
        }
    };

    let split = DatasetSplit {
        schema: schema.clone(),
        train_counts: ClassCounts::from_labels(&y_train),
        test_counts: ClassCounts::from_labels(&y_test),
        x_train,
        y_train,
        x_test,
        y_test,
        train_timestamps: timestamps,
        test_timestamps,
        train_counts_before,
        dropped_rows,
        synthetic_rows: synthetic,
    };
    info!(
        dropped = split.dropped_rows,
        train_rows = n_train,
        test_rows = n_test,
        train_neg = split.train_counts_before.negative,
        train_pos = split.train_counts_before.positive,
        resampled_neg = split.train_counts.negative,
        resampled_pos = split.train_counts.positive,
        test_neg = split.test_counts.negative,
        test_pos = split.test_counts.positive,
        "dataset built"
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn table(n: usize) -> LabeledTable {
        let timestamps = (0..n)
            .map(|i| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(i as i64))
            .collect();
        let labels = (0..n).map(|i| Some(u8::from(i % 4 == 0))).collect();
        let mut table = LabeledTable::new(timestamps, labels).unwrap();
        table
            .push_column("a", (0..n).map(|i| i as f64).collect())
            .unwrap();
        table
            .push_column("b", (0..n).map(|i| (i as f64).sin()).collect())
            .unwrap();
        table
    }

    #[test]
    fn test_partition_rounds_up() {
        assert_eq!(test_rows(10, 0.2), 2);
        assert_eq!(test_rows(11, 0.2), 3);
        assert_eq!(test_rows(5, 0.0), 0);
    }

    #[test]
    fn incomplete_rows_are_dropped_before_split() {
        let mut t = table(20);
        t.labels[19] = None;
        t.columns[0].1[0] = f64::NAN;
        let schema = FeatureSchema::new(["a", "b"]).unwrap();
        let split = build_dataset(
            &t,
            &schema,
            &SplitConfig::default(),
            &OversampleConfig {
                enabled: false,
                ..OversampleConfig::default()
            },
        )
        .unwrap();
        assert_eq!(split.dropped_rows, 2);
        assert_eq!(split.x_train.len() + split.x_test.len(), 18);
        assert_eq!(split.x_test.len(), 4);
        assert_eq!(split.x_train[0][0], 1.0);
    }

    #[test]
    fn schema_order_governs_feature_vectors() {
        let t = table(10);
        let schema = FeatureSchema::new(["b", "a"]).unwrap();
        let split = build_dataset(
            &t,
            &schema,
            &SplitConfig { test_size: 0.0 },
            &OversampleConfig {
                enabled: false,
                ..OversampleConfig::default()
            },
        )
        .unwrap();
        assert_eq!(split.x_train[3], vec![(3.0f64).sin(), 3.0]);
    }

    #[test]
    fn empty_training_partition_is_fatal() {
        let mut t = table(6);
        for label in t.labels.iter_mut() {
            *label = None;
        }
        let schema = FeatureSchema::new(["a"]).unwrap();
        let err = build_dataset(
            &t,
            &schema,
            &SplitConfig::default(),
            &OversampleConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyTrainingSet { rows: 0 })
        ));
    }

    #[test]
    fn filter_rows_keeps_alignment() {
        let t = table(8);
        let kept = t.filter_rows(|row| row % 2 == 1);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept.column("a"), Some([1.0, 3.0, 5.0, 7.0].as_slice()));
        assert_eq!(kept.timestamps()[0], t.timestamps()[1]);
        assert_eq!(kept.labels()[0], t.labels()[1]);
    }
}
