pub mod artifact;
pub mod bar;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod gbm;
pub mod label;
pub mod metrics;
pub mod oversample;
pub mod predictor;
pub mod process;
pub mod schema;
pub mod search;
pub mod trainer;

pub use artifact::TrainedArtifact;
pub use bar::Bar;
pub use config::{Config, LabelConfig, OversampleConfig, ParamGrid, SearchConfig, SplitConfig};
pub use error::PipelineError;
pub use predictor::{Signal, SignalReason};
pub use schema::FeatureSchema;
pub use ta_rs::IndicatorConfig;
