use std::{fmt, path::PathBuf};
use thiserror::Error;

use crate::target::Target;

/// A field whose value fell outside the range the models were trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeViolation {
    pub field: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} outside [{}, {}]",
            self.field, self.value, self.min, self.max
        )
    }
}

/// Everything wrong with one race entry, reported at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationError {
    pub missing: Vec<String>,
    pub non_numeric: Vec<String>,
    pub out_of_range: Vec<RangeViolation>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.non_numeric.is_empty() && self.out_of_range.is_empty()
    }

    /// True if `field` is named anywhere in this error.
    pub fn mentions(&self, field: &str) -> bool {
        self.missing.iter().any(|f| f == field)
            || self.non_numeric.iter().any(|f| f == field)
            || self.out_of_range.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing required fields: {}", self.missing.join(", ")));
        }
        if !self.non_numeric.is_empty() {
            parts.push(format!("fields must be finite numbers: {}", self.non_numeric.join(", ")));
        }
        for violation in &self.out_of_range {
            parts.push(violation.to_string());
        }
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Failure of a whole `predict` call. Per-target failures never surface here.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid race entry: {0}")]
    Validation(#[from] ValidationError),

    #[error("feature contract mismatch: {0}")]
    SchemaMismatch(String),

    #[error("prediction service is not ready")]
    NotReady,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature count mismatch: got {got}, expected {expected}")]
    FeatureCountMismatch { expected: usize, got: usize },

    #[error("corrupted tree {tree}: node {node} is out of bounds")]
    CorruptTree { tree: usize, node: usize },

    #[error("non-finite {0}")]
    NonFinite(&'static str),

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("training labels contain a single class")]
    SingleClass,
}

/// Reading or writing a persisted artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read or write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} holds the bundle for '{found}', expected '{expected}'")]
    WrongTarget {
        path: PathBuf,
        expected: Target,
        found: Target,
    },
}

/// Broken invariant of a feature contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("contract has no feature columns")]
    Empty,

    #[error("feature '{0}' listed more than once")]
    Duplicate(String),

    #[error("feature '{0}' is both numeric and categorical")]
    Overlap(String),

    #[error("feature '{0}' is neither numeric nor categorical")]
    Unclassified(String),

    #[error("feature '{0}' is classified but not in feature_columns")]
    NotAColumn(String),
}

/// Why the service could not become ready.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("invalid feature contract: {0}")]
    Contract(#[from] ContractError),

    #[error("no targets requested")]
    NoTargets,

    #[error("no model bundle loaded for target '{0}'")]
    MissingBundle(Target),

    #[error("bundle for '{target}' expects {got} features, contract has {expected}")]
    WidthMismatch {
        target: Target,
        expected: usize,
        got: usize,
    },

    #[error("service is already initialized; restart to reload models")]
    AlreadyReady,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("dataset has no header row")]
    MissingHeader,

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: expected {expected} fields, got {got}")]
    RaggedRow {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("required column '{0}' not present")]
    MissingColumn(String),

    #[error("no rows left after removing missing values")]
    Empty,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("invalid feature contract: {0}")]
    Contract(#[from] ContractError),

    #[error("target '{target}': {reason}")]
    Target { target: Target, reason: String },

    #[error("no target trained successfully ({0} failed)")]
    NothingTrained(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),
}
