//! L2-regularized logistic regression fitted by full-batch gradient descent.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone)]
pub struct LogisticConfig {
    pub iterations: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.1,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub bias: f64,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticRegression {
    /// Deterministic: starts from zero weights and the prior log-odds.
    pub fn fit(x: &[Vec<f64>], y: &[bool], config: &LogisticConfig) -> Result<Self, ModelError> {
        let width = x.first().map(Vec::len).ok_or(ModelError::EmptyTrainingSet)?;
        if x.len() != y.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: x.len(),
                got: y.len(),
            });
        }
        let positives = y.iter().filter(|v| **v).count();
        if positives == 0 || positives == y.len() {
            return Err(ModelError::SingleClass);
        }

        let n = x.len() as f64;
        let prior = positives as f64 / n;
        let mut model = Self {
            weights: vec![0.0; width],
            bias: (prior / (1.0 - prior)).ln(),
        };

        let mut grad_w = vec![0.0; width];
        for _ in 0..config.iterations {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for (row, label) in x.iter().zip(y) {
                let residual = sigmoid(model.margin(row)) - if *label { 1.0 } else { 0.0 };
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += residual * v;
                }
                grad_b += residual;
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= config.learning_rate * (g / n + config.l2 * *w);
            }
            model.bias -= config.learning_rate * grad_b / n;
        }

        if !model.bias.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::NonFinite("logistic regression weights"));
        }
        Ok(model)
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn margin(&self, row: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.weights.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.weights.len(),
                got: row.len(),
            });
        }
        let p = sigmoid(self.margin(row));
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ModelError::NonFinite("logistic regression output"))
        }
    }

    /// Absolute weights; comparable across features because inputs are
    /// standardized.
    pub fn feature_importance(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.abs()).collect()
    }
}
