#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use swingsmith_rs::config::{Config, ParamGrid, SearchConfig};
use swingsmith_rs::Bar;

pub const CYCLE: usize = 25;
pub const DIP_PHASE: usize = 15;

pub fn day(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: day(i),
                open,
                high: open.max(close) * 1.002,
                low: open.min(close) * 0.998,
                close,
                volume: 1_000_000.0 + (i % 7) as f64 * 10_000.0,
            }
        })
        .collect()
}

/// Repeating swing pattern: a quiet stretch, a 2.5% drop at `DIP_PHASE`, a
/// five-bar rally to +3% and a hold. Only the dip bar of each cycle reaches
/// the +5% barrier before the -2% barrier.
pub fn swing_closes(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let phase = i % CYCLE;
            match phase {
                0..=14 => 100.0 * (1.0 + 0.003 * (1.3 * i as f64).sin()),
                15 => 97.5,
                16..=20 => 97.5 + (phase - 15) as f64 * 1.1,
                _ => 103.0,
            }
        })
        .collect()
}

pub fn write_raw_csv(path: &Path, bars: &[Bar]) -> anyhow::Result<()> {
    let mut out = String::from("Date,Open,High,Low,Close,Volume\n");
    for bar in bars {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            bar.timestamp.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        )?;
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub fn bars_json(bars: &[Bar]) -> String {
    let items: Vec<serde_json::Value> = bars
        .iter()
        .map(|bar| {
            serde_json::json!({
                "t": bar.timestamp.to_rfc3339(),
                "o": bar.open,
                "h": bar.high,
                "l": bar.low,
                "c": bar.close,
                "v": bar.volume,
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

/// Config rooted at `root` with a one-candidate grid.
pub fn small_config(root: &Path, symbol: &str) -> Config {
    Config {
        data_dir: root.join("data"),
        processed_dir: root.join("processed"),
        model_dir: root.join("models"),
        watchlist: vec![symbol.to_string()],
        training_symbol: symbol.to_string(),
        search: SearchConfig {
            grid: ParamGrid {
                n_estimators: vec![60],
                max_depth: vec![3],
                learning_rate: vec![0.3],
            },
            n_workers: 2,
            ..SearchConfig::default()
        },
        ..Config::default()
    }
}
