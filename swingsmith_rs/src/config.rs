use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ta_rs::IndicatorConfig;

/// Triple-barrier labeling parameters. Barriers are fractions of the entry
/// close: a `profit_target` of 0.05 means +5%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub forward_window: usize,
    pub profit_target: f64,
    pub stop_loss: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            forward_window: 20,
            profit_target: 0.05,
            stop_loss: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of the most recent rows held out for evaluation.
    pub test_size: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { test_size: 0.2 }
    }
}

/// Minority oversampling applied to the training partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OversampleConfig {
    pub enabled: bool,
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for OversampleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// Hyperparameter axes swept by the grid search. Every combination of the
/// three lists is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200],
            max_depth: vec![3, 5, 7],
            learning_rate: vec![0.01, 0.1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub grid: ParamGrid,
    pub cv_folds: usize,
    /// Worker threads for the candidate sweep. Zero uses every logical core.
    pub n_workers: usize,
    pub min_samples_leaf: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::default(),
            cv_folds: 3,
            n_workers: 0,
            min_samples_leaf: 1,
        }
    }
}

/// Everything a pipeline stage needs. Built once by the CLI and passed down;
/// nothing in the library reads process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding raw `{SYMBOL}.csv` bar files.
    pub data_dir: PathBuf,
    /// Directory receiving `{SYMBOL}_processed.csv` tables.
    pub processed_dir: PathBuf,
    pub model_dir: PathBuf,
    pub model_file: String,
    pub watchlist: Vec<String>,
    pub training_symbol: String,
    pub label: LabelConfig,
    pub indicators: IndicatorConfig,
    pub split: SplitConfig,
    pub oversample: OversampleConfig,
    pub search: SearchConfig,
}

fn default_model_file() -> String {
    "swing_trader_model.json".to_string()
}

fn default_watchlist() -> Vec<String> {
    ["SPY", "BND", "GLD", "AAPL", "MSFT", "TSLA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_training_symbol() -> String {
    "AAPL".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            processed_dir: PathBuf::from("processed_data"),
            model_dir: PathBuf::from("models"),
            model_file: default_model_file(),
            watchlist: default_watchlist(),
            training_symbol: default_training_symbol(),
            label: LabelConfig::default(),
            indicators: IndicatorConfig::default(),
            split: SplitConfig::default(),
            oversample: OversampleConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Read a JSON config file; omitted sections take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Unable to open config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn raw_path(&self, symbol: &str) -> PathBuf {
        raw_path(&self.data_dir, symbol)
    }

    pub fn processed_path(&self, symbol: &str) -> PathBuf {
        processed_path(&self.processed_dir, symbol)
    }

    /// Settings that produced `{SYMBOL}_processed.csv`, stored beside it.
    pub fn manifest_path(&self, symbol: &str) -> PathBuf {
        self.processed_dir.join(format!("{symbol}_processed.json"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }
}

pub fn raw_path(data_dir: &Path, symbol: &str) -> PathBuf {
    data_dir.join(format!("{symbol}.csv"))
}

pub fn processed_path(processed_dir: &Path, symbol: &str) -> PathBuf {
    processed_dir.join(format!("{symbol}_processed.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_swing_settings() {
        let config = Config::default();
        assert_eq!(config.label.forward_window, 20);
        assert_eq!(config.label.profit_target, 0.05);
        assert_eq!(config.label.stop_loss, 0.02);
        assert_eq!(config.split.test_size, 0.2);
        assert_eq!(config.search.cv_folds, 3);
        assert_eq!(config.watchlist.len(), 6);
        assert_eq!(
            config.processed_path("AAPL"),
            PathBuf::from("processed_data/AAPL_processed.csv")
        );
        assert_eq!(
            config.model_path(),
            PathBuf::from("models/swing_trader_model.json")
        );
    }

    #[test]
    fn partial_config_fills_defaults() {
        let json = r#"{"data_dir":"d","label":{"forward_window":5,"profit_target":0.1,"stop_loss":0.05}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.label.forward_window, 5);
        assert_eq!(config.data_dir, PathBuf::from("d"));
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert_eq!(config.training_symbol, "AAPL");
        assert_eq!(config.search.grid.max_depth, vec![3, 5, 7]);
    }

    #[test]
    fn single_nested_knob_keeps_its_siblings() {
        let config: Config =
            serde_json::from_str(r#"{"search":{"cv_folds":5,"grid":{"max_depth":[2]}},"label":{"stop_loss":0.03}}"#)
                .unwrap();
        assert_eq!(config.search.cv_folds, 5);
        assert_eq!(config.search.grid.max_depth, vec![2]);
        assert_eq!(config.search.grid.n_estimators, vec![100, 200]);
        assert_eq!(config.search.n_workers, 0);
        assert_eq!(config.label.stop_loss, 0.03);
        assert_eq!(config.label.forward_window, 20);
        assert!(config.oversample.enabled);
    }
}
