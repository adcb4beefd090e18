//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy second-order tree construction used by the boosted
//! classifier: each split maximizes the gradient/hessian gain, each leaf
//! holds the Newton step `-G / (H + lambda)`.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub l2: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_leaf: 20,
            l2: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Set on leaves only.
    pub value: Option<f64>,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root. A child index outside the node table, or a walk
    /// longer than the table, means the tree is corrupted.
    pub fn evaluate(&self, row: &[f64], tree_idx: usize) -> Result<f64, ModelError> {
        let mut idx = 0usize;
        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(idx).ok_or(ModelError::CorruptTree {
                tree: tree_idx,
                node: idx,
            })?;
            if let Some(value) = node.value {
                return Ok(value);
            }
            let x = row.get(node.feature).ok_or(ModelError::FeatureCountMismatch {
                expected: node.feature + 1,
                got: row.len(),
            })?;
            idx = if *x <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
        Err(ModelError::CorruptTree {
            tree: tree_idx,
            node: idx,
        })
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Build one regression tree over gradient statistics
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        assert_eq!(features.len(), gradients.len());
        assert_eq!(features.len(), hessians.len());

        let feature_count = features.first().map_or(0, Vec::len);

        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    /// Build the tree; split gains are added to `importance` per feature.
    pub fn build(&self, importance: &mut [f64]) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.features.len()).collect();

        self.build_node(&indices, 0, &mut nodes, importance);

        Tree { nodes }
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        importance: &mut [f64],
    ) -> usize {
        let current_idx = nodes.len();
        let leaf_value = self.leaf_value(indices);

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf.max(1) {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        }

        let split = match self.find_best_split(indices) {
            Some(s) => s,
            None => {
                nodes.push(Node::leaf(leaf_value));
                return current_idx;
            }
        };

        let (left_indices, right_indices) = self.split_samples(indices, split.feature, split.threshold);

        // Reserve space for current node
        nodes.push(Node {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });
        if let Some(slot) = importance.get_mut(split.feature) {
            *slot += split.gain;
        }

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, importance);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, importance);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx
    }

    /// Sweep each feature in sorted order, considering a threshold between
    /// every pair of distinct adjacent values. Ties keep the earliest
    /// (feature, threshold) so the result is deterministic.
    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let (g_total, h_total) = self.sum_gradients_hessians(indices);
        let parent_score = self.score(g_total, h_total);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        let mut sorted = indices.to_vec();
        for feature in 0..self.feature_count {
            sorted.sort_by(|a, b| {
                self.features[*a][feature]
                    .total_cmp(&self.features[*b][feature])
                    .then(a.cmp(b))
            });

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for (pos, &idx) in sorted.iter().enumerate().take(sorted.len() - 1) {
                g_left += self.gradients[idx];
                h_left += self.hessians[idx];

                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = self.features[idx][feature];
                let next = self.features[sorted[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let gain = self.score(g_left, h_left)
                    + self.score(g_total - g_left, h_total - h_left)
                    - parent_score;
                if gain <= 1e-12 {
                    continue;
                }
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn split_samples(&self, indices: &[usize], feature: usize, threshold: f64) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .partition(|&&idx| self.features[idx][feature] <= threshold)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.l2)
    }

    fn sum_gradients_hessians(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(g, h), &idx| {
            (g + self.gradients[idx], h + self.hessians[idx])
        })
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let (g, h) = self.sum_gradients_hessians(indices);
        -g / (h + self.config.l2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tree() {
        let features = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0], vec![4.0, 5.0]];
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![0.25; 4];

        let config = TreeConfig {
            max_depth: 2,
            min_samples_leaf: 1,
            l2: 0.0,
        };

        let mut importance = vec![0.0; 2];
        let tree = CartBuilder::new(&features, &gradients, &hessians, config).build(&mut importance);

        assert_eq!(tree.nodes[0].feature, 0);
        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert!(importance[0] > 0.0);
        assert_eq!(importance[1], 0.0);
        assert!(tree.evaluate(&[1.0, 5.0], 0).unwrap() > 0.0);
        assert!(tree.evaluate(&[4.0, 5.0], 0).unwrap() < 0.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = vec![vec![1.0]];
        let gradients = vec![-1.0];
        let hessians = vec![1.0];

        let mut importance = vec![0.0];
        let tree = CartBuilder::new(&features, &gradients, &hessians, TreeConfig::default())
            .build(&mut importance);

        assert_eq!(tree.nodes.len(), 1);
        assert!(tree.nodes[0].value.is_some());
    }

    #[test]
    fn dangling_child_is_reported() {
        let tree = Tree {
            nodes: vec![Node {
                feature: 0,
                threshold: 0.0,
                left: 7,
                right: 7,
                value: None,
            }],
        };
        assert!(matches!(
            tree.evaluate(&[1.0], 3),
            Err(ModelError::CorruptTree { tree: 3, node: 7 })
        ));
    }

    #[test]
    fn cyclic_tree_terminates() {
        let tree = Tree {
            nodes: vec![Node {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
                value: None,
            }],
        };
        assert!(tree.evaluate(&[1.0], 0).is_err());
    }
}
