//! Race outcome prediction: offline training of per-target classifiers from
//! historical race data, and an inference service that scores one driver's
//! race entry against every served target.

pub mod api;
pub mod artifacts;
pub mod cart;
pub mod config;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod gbdt;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod process;
pub mod report;
pub mod scaler;
pub mod service;
pub mod target;
pub mod trainer;
pub mod types;
pub mod validation;

pub use contract::FeatureContract;
pub use error::{LoadError, PredictError, TrainError, ValidationError};
pub use model::{ModelBundle, ModelKind};
pub use service::Predictor;
pub use target::Target;
pub use types::{PredictionResult, RaceEntryInput};

/// Default `tracing` filter for the binaries.
pub const DEFAULT_LOG_FILTER: &str =
    "race_predictor=info,train=info,predict=info,process=info,tower_http=info";
