//! Gradient Boosted Decision Tree (GBDT) binary classifier
//!
//! Boosts CART trees on the log-loss: every round fits a tree to the
//! gradient `p - y` and hessian `p(1 - p)` of the current margin.

use serde::{Deserialize, Serialize};

use crate::{
    cart::{CartBuilder, Tree, TreeConfig},
    error::ModelError,
    logistic::sigmoid,
};

/// GBDT training configuration
#[derive(Clone, Debug)]
pub struct GbdtConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            max_depth: 5,
            min_samples_leaf: 20,
            learning_rate: 0.1,
            l2: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub n_features: usize,
    /// Prior log-odds the trees are added to.
    pub base_margin: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
    /// Total split gain per feature across all trees.
    pub feature_importance: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn fit(x: &[Vec<f64>], y: &[bool], config: &GbdtConfig) -> Result<Self, ModelError> {
        let n_features = x.first().map(Vec::len).ok_or(ModelError::EmptyTrainingSet)?;
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

        let prior = positives as f64 / y.len() as f64;
        let base_margin = (prior / (1.0 - prior)).ln();
        let targets: Vec<f64> = y.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect();

        let mut margins = vec![base_margin; x.len()];
        let mut trees = Vec::with_capacity(config.num_trees);
        let mut feature_importance = vec![0.0; n_features];
        let tree_config = TreeConfig {
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
            l2: config.l2,
        };

        for tree_idx in 0..config.num_trees {
            tracing::trace!("fitting tree {}/{}", tree_idx + 1, config.num_trees);

            let probs: Vec<f64> = margins.iter().map(|m| sigmoid(*m)).collect();
            let gradients: Vec<f64> = probs.iter().zip(&targets).map(|(p, t)| p - t).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| (p * (1.0 - p)).max(1e-16)).collect();

            let builder = CartBuilder::new(x, &gradients, &hessians, tree_config.clone());
            let tree = builder.build(&mut feature_importance);

            for (row, margin) in x.iter().zip(margins.iter_mut()) {
                *margin += config.learning_rate * tree.evaluate(row, tree_idx)?;
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features,
            base_margin,
            learning_rate: config.learning_rate,
            trees,
            feature_importance,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let mut margin = self.base_margin;
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            margin += self.learning_rate * tree.evaluate(row, tree_idx)?;
        }
        if !margin.is_finite() {
            return Err(ModelError::NonFinite("boosted margin"));
        }
        Ok(sigmoid(margin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::Node;

    fn dataset() -> (Vec<Vec<f64>>, Vec<bool>) {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64, (i % 7) as f64])
            .collect();
        let y = x.iter().map(|r| r[0] < 15.0).collect();
        (x, y)
    }

    fn small_config() -> GbdtConfig {
        GbdtConfig {
            num_trees: 10,
            max_depth: 2,
            min_samples_leaf: 3,
            learning_rate: 0.3,
            l2: 1.0,
        }
    }

    #[test]
    fn separates_a_threshold_concept() {
        let (x, y) = dataset();
        let model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        assert_eq!(model.trees.len(), 10);
        assert!(model.predict_proba(&[2.0, 1.0]).unwrap() > 0.7);
        assert!(model.predict_proba(&[50.0, 1.0]).unwrap() < 0.3);
        assert!(model.feature_importance[0] > model.feature_importance[1]);
    }

    #[test]
    fn test_determinism() {
        let (x, y) = dataset();
        let a = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        let b = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn corrupted_tree_fails_prediction() {
        let (x, y) = dataset();
        let mut model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        model.trees[3].nodes = vec![Node {
            feature: 0,
            threshold: 1.0,
            left: 40,
            right: 41,
            value: None,
        }];
        assert!(matches!(
            model.predict_proba(&[2.0, 1.0]),
            Err(ModelError::CorruptTree { tree: 3, .. })
        ));
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = dataset();
        let model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        for row in &x {
            let p = model.predict_proba(row).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
