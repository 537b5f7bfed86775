use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use swingsmith_rs::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "swingsmith",
    version,
    about = "Swing-trade entry signals from daily bars"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute indicators and triple-barrier labels for every watchlist symbol
    #[command(name = "process")]
    Process(ProcessArgs),
    /// Fit, evaluate and persist the classifier for the training symbol
    #[command(name = "train")]
    Train(TrainArgs),
    /// Read a JSON bar window from stdin and print 0 or 1
    #[command(name = "predict")]
    Predict(PredictArgs),
}

/// Locations shared by every subcommand. Unset flags fall back to the config
/// file (when given) and then to built-in defaults.
#[derive(Args, Debug)]
pub struct PathArgs {
    /// Optional JSON config file supplying defaults for every setting
    #[arg(long = "config", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Directory holding raw {SYMBOL}.csv files
    #[arg(long = "data-dir", value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Directory for {SYMBOL}_processed.csv files
    #[arg(long = "processed-dir", value_hint = clap::ValueHint::DirPath)]
    pub processed_dir: Option<PathBuf>,

    /// Directory holding the model artifact
    #[arg(long = "model-dir", value_hint = clap::ValueHint::DirPath)]
    pub model_dir: Option<PathBuf>,

    /// Model artifact file name inside --model-dir
    #[arg(long = "model-file")]
    pub model_file: Option<String>,
}

impl PathArgs {
    fn base_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(file) = &self.model_file {
            config.model_file = file.clone();
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Comma-separated symbols to process (defaults to the built-in watchlist)
    #[arg(long = "symbols", value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Bars scanned after each entry before the time barrier expires
    #[arg(long = "forward-window")]
    pub forward_window: Option<usize>,

    /// Profit barrier as a fraction of the entry close (0.05 = +5%)
    #[arg(long = "profit-target")]
    pub profit_target: Option<f64>,

    /// Stop barrier as a fraction of the entry close (0.02 = -2%)
    #[arg(long = "stop-loss")]
    pub stop_loss: Option<f64>,

    /// Disable writing swingsmith.log in the processed directory
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

impl ProcessArgs {
    pub fn into_config(self) -> Result<Config> {
        let mut config = self.paths.base_config()?;
        if let Some(symbols) = self.symbols {
            config.watchlist = symbols
                .into_iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(window) = self.forward_window {
            config.label.forward_window = window;
        }
        if let Some(target) = self.profit_target {
            config.label.profit_target = target;
        }
        if let Some(stop) = self.stop_loss {
            config.label.stop_loss = stop;
        }
        if config.watchlist.is_empty() {
            bail!("watchlist is empty");
        }
        if !(config.label.profit_target > 0.0) || !(0.0..1.0).contains(&config.label.stop_loss) {
            bail!(
                "profit target must be positive and stop loss in [0, 1), got {} and {}",
                config.label.profit_target,
                config.label.stop_loss
            );
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Symbol whose processed table is used for training
    #[arg(long = "symbol")]
    pub symbol: Option<String>,

    /// Fraction of the most recent rows held out for evaluation
    #[arg(long = "test-size")]
    pub test_size: Option<f64>,

    /// Cross-validation folds
    #[arg(long = "cv-folds")]
    pub cv_folds: Option<usize>,

    /// Tree counts to search (comma-separated)
    #[arg(long = "n-estimators", value_delimiter = ',')]
    pub n_estimators: Option<Vec<usize>>,

    /// Maximum tree depths to search (comma-separated)
    #[arg(long = "max-depth", value_delimiter = ',')]
    pub max_depth: Option<Vec<usize>>,

    /// Learning rates to search (comma-separated)
    #[arg(long = "learning-rate", value_delimiter = ',')]
    pub learning_rate: Option<Vec<f64>>,

    /// Minimum rows per leaf
    #[arg(long = "min-samples-leaf")]
    pub min_samples_leaf: Option<usize>,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers", alias = "n-jobs")]
    pub workers: Option<usize>,

    /// Seed for minority oversampling
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Neighbours used for minority oversampling
    #[arg(long = "k-neighbors")]
    pub k_neighbors: Option<usize>,

    /// Train on the raw class balance
    #[arg(long = "no-oversample", default_value_t = false)]
    pub no_oversample: bool,

    /// Disable writing swingsmith.log in the model directory
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

impl TrainArgs {
    pub fn into_config(self) -> Result<Config> {
        let mut config = self.paths.base_config()?;
        if let Some(symbol) = self.symbol {
            config.training_symbol = symbol.trim().to_uppercase();
        }
        if let Some(test_size) = self.test_size {
            config.split.test_size = test_size;
        }
        if let Some(folds) = self.cv_folds {
            config.search.cv_folds = folds;
        }
        if let Some(values) = self.n_estimators {
            config.search.grid.n_estimators = values;
        }
        if let Some(values) = self.max_depth {
            config.search.grid.max_depth = values;
        }
        if let Some(values) = self.learning_rate {
            config.search.grid.learning_rate = values;
        }
        if let Some(min_leaf) = self.min_samples_leaf {
            config.search.min_samples_leaf = min_leaf;
        }
        if let Some(workers) = self.workers {
            config.search.n_workers = workers;
        }
        if let Some(seed) = self.seed {
            config.oversample.seed = seed;
        }
        if let Some(k) = self.k_neighbors {
            config.oversample.k_neighbors = k;
        }
        if self.no_oversample {
            config.oversample.enabled = false;
        }

        if !(0.0..1.0).contains(&config.split.test_size) {
            bail!("--test-size must be in [0, 1), got {}", config.split.test_size);
        }
        if config.search.cv_folds < 2 {
            bail!("--cv-folds must be at least 2");
        }
        if config.oversample.k_neighbors == 0 {
            bail!("--k-neighbors must be at least 1");
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub paths: PathArgs,
}

impl PredictArgs {
    pub fn into_config(self) -> Result<Config> {
        self.paths.base_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_flags_override_defaults() {
        let cli = Cli::parse_from([
            "swingsmith",
            "train",
            "--symbol",
            "msft",
            "--n-estimators",
            "50,75",
            "--learning-rate",
            "0.2",
            "--workers",
            "2",
            "--no-oversample",
        ]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.training_symbol, "MSFT");
        assert_eq!(config.search.grid.n_estimators, vec![50, 75]);
        assert_eq!(config.search.grid.learning_rate, vec![0.2]);
        assert_eq!(config.search.grid.max_depth, vec![3, 5, 7]);
        assert_eq!(config.search.n_workers, 2);
        assert!(!config.oversample.enabled);
    }

    #[test]
    fn process_symbols_are_normalised() {
        let cli = Cli::parse_from([
            "swingsmith",
            "process",
            "--symbols",
            "aapl, tsla",
            "--data-dir",
            "raw",
        ]);
        let Commands::Process(args) = cli.command else {
            panic!("expected process");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.watchlist, vec!["AAPL", "TSLA"]);
        assert_eq!(config.data_dir, PathBuf::from("raw"));
        assert_eq!(config.label.forward_window, 20);
    }

    #[test]
    fn invalid_test_size_is_rejected() {
        let cli = Cli::parse_from(["swingsmith", "train", "--test-size", "1.5"]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert!(args.into_config().is_err());
    }
}
