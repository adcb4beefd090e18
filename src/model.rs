use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::{
    artifacts,
    error::{ArtifactError, ModelError},
    gbdt::GradientBoostedTrees,
    logistic::LogisticRegression,
    scaler::StandardScaler,
    target::Target,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    GradientBoosting,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::GradientBoosting => "Gradient Boosting",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "logistic_regression" | "logistic" => Ok(ModelKind::LogisticRegression),
            "gradient_boosting" | "gbdt" => Ok(ModelKind::GradientBoosting),
            other => Err(format!("unknown model kind '{other}'")),
        }
    }
}

/// A fitted binary classifier over scaled features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LogisticRegression),
    GradientBoosting(GradientBoostedTrees),
}

impl Classifier {
    pub fn kind(&self) -> ModelKind {
        match self {
            Classifier::LogisticRegression(_) => ModelKind::LogisticRegression,
            Classifier::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Classifier::LogisticRegression(m) => m.n_features(),
            Classifier::GradientBoosting(m) => m.n_features,
        }
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, scaled: &[f64]) -> Result<f64, ModelError> {
        let p = match self {
            Classifier::LogisticRegression(m) => m.predict_proba(scaled)?,
            Classifier::GradientBoosting(m) => m.predict_proba(scaled)?,
        };
        if (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(ModelError::NonFinite("probability"))
        }
    }

    pub fn feature_importance(&self) -> Vec<f64> {
        match self {
            Classifier::LogisticRegression(m) => m.feature_importance(),
            Classifier::GradientBoosting(m) => m.feature_importance.clone(),
        }
    }
}

/// Scaler and classifier for one target, always applied together and
/// persisted together in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub target: Target,
    pub scaler: StandardScaler,
    pub classifier: Classifier,
}

impl ModelBundle {
    pub fn new(target: Target, scaler: StandardScaler, classifier: Classifier) -> Self {
        Self {
            target,
            scaler,
            classifier,
        }
    }

    /// Feature width, or `None` if scaler and classifier disagree.
    pub fn n_features(&self) -> Option<usize> {
        let n = self.scaler.n_features();
        (n == self.classifier.n_features()).then_some(n)
    }

    /// Scale the raw, contract-ordered features and return P(positive).
    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let scaled = self.scaler.transform(features)?;
        self.classifier.predict_proba(&scaled)
    }

    pub fn load(dir: &Path, target: Target) -> Result<Self, ArtifactError> {
        let path = artifacts::bundle_path(dir, target);
        let bundle: Self = artifacts::read_json(&path)?;
        if bundle.target != target {
            return Err(ArtifactError::WrongTarget {
                path,
                expected: target,
                found: bundle.target,
            });
        }
        Ok(bundle)
    }

    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        artifacts::write_json(&artifacts::bundle_path(dir, self.target), self)
    }
}
