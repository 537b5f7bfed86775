mod common;

use anyhow::Result;
use swingsmith_rs::bar;
use swingsmith_rs::config::{LabelConfig, OversampleConfig, SplitConfig};
use swingsmith_rs::dataset::{ClassCounts, LabeledTable, build_dataset};
use swingsmith_rs::label::triple_barrier_labels;
use swingsmith_rs::{FeatureSchema, IndicatorConfig};
use ta_rs::compute_indicators;

fn swing_table(len: usize) -> Result<LabeledTable> {
    let bars = common::bars_from_closes(&common::swing_closes(len));
    let frame = compute_indicators(&bar::to_price_series(&bars), &IndicatorConfig::default());
    let labels = triple_barrier_labels(&bar::closes(&bars), &LabelConfig::default());
    LabeledTable::from_bars(&bars, &frame, labels)
}

#[test]
fn training_rows_precede_test_rows() -> Result<()> {
    let table = swing_table(300)?;
    let schema = FeatureSchema::for_indicators(&IndicatorConfig::default())?;
    let split = build_dataset(
        &table,
        &schema,
        &SplitConfig::default(),
        &OversampleConfig::default(),
    )?;

    let last_train = split.train_timestamps.iter().max().copied();
    let first_test = split.test_timestamps.iter().min().copied();
    assert!(last_train.is_some() && first_test.is_some());
    assert!(last_train < first_test);
    assert!(split.train_timestamps.windows(2).all(|w| w[0] < w[1]));

    // 49 warm-up rows and 20 unlabeled trailing rows are gone.
    assert_eq!(split.dropped_rows, 49 + 20);
    let cleaned = 300 - 49 - 20;
    assert_eq!(split.test_timestamps.len(), (cleaned as f64 * 0.2).ceil() as usize);
    Ok(())
}

#[test]
fn only_training_partition_is_resampled() -> Result<()> {
    let table = swing_table(300)?;
    let schema = FeatureSchema::for_indicators(&IndicatorConfig::default())?;
    let plain = build_dataset(
        &table,
        &schema,
        &SplitConfig::default(),
        &OversampleConfig {
            enabled: false,
            ..OversampleConfig::default()
        },
    )?;
    let resampled = build_dataset(
        &table,
        &schema,
        &SplitConfig::default(),
        &OversampleConfig::default(),
    )?;

    assert!(plain.train_counts.positive < plain.train_counts.negative);
    assert!(resampled.train_counts.is_balanced());
    assert_eq!(resampled.train_counts.negative, plain.train_counts.negative);
    assert_eq!(
        resampled.synthetic_rows,
        plain.train_counts.negative - plain.train_counts.positive
    );
    assert_eq!(resampled.train_counts_before, plain.train_counts);

    assert_eq!(resampled.x_test, plain.x_test);
    assert_eq!(resampled.y_test, plain.y_test);
    assert_eq!(resampled.test_counts, ClassCounts::from_labels(&plain.y_test));
    assert_eq!(&resampled.x_train[..plain.x_train.len()], plain.x_train.as_slice());
    Ok(())
}

#[test]
fn feature_vectors_use_declared_order() -> Result<()> {
    let table = swing_table(120)?;
    let reversed: Vec<String> = IndicatorConfig::default()
        .column_names()
        .into_iter()
        .rev()
        .collect();
    let schema = FeatureSchema::new(reversed)?;
    let split = build_dataset(
        &table,
        &schema,
        &SplitConfig { test_size: 0.0 },
        &OversampleConfig {
            enabled: false,
            ..OversampleConfig::default()
        },
    )?;
    let first_row = 49;
    let macds = table.column("macds_12_26_9").map(|c| c[first_row]);
    let sma = table.column("sma_10").map(|c| c[first_row]);
    assert_eq!(split.x_train[0].first().copied(), macds);
    assert_eq!(split.x_train[0].last().copied(), sma);
    Ok(())
}
