//! Binary gradient-boosted regression trees on logistic loss.
//!
//! Each round fits one tree to the gradient and hessian of the log loss at
//! the current raw scores. Leaves hold Newton steps `-G / (H + lambda)`,
//! splits are exact (every midpoint between distinct sorted values is tried)
//! and are kept only when their gain is positive.

use anyhow::{Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

/// Probability clamp used when deriving the initial log-odds.
const BASE_RATE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values.
    pub lambda: f64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            lambda: 1.0,
        }
    }
}

impl GbmParams {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "learning_rate must be positive, got {}",
            self.learning_rate
        );
        ensure!(self.min_samples_leaf >= 1, "min_samples_leaf must be at least 1");
        ensure!(
            self.lambda >= 0.0 && self.lambda.is_finite(),
            "lambda must be non-negative, got {}",
            self.lambda
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "tree has no nodes");
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                ensure!(*feature < n_features, "node {idx} splits on feature {feature}");
                // Children are always allocated after their parent.
                ensure!(
                    *left > idx && *right > idx && *left < self.nodes.len() && *right < self.nodes.len(),
                    "node {idx} has out-of-range children"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmClassifier {
    params: GbmParams,
    n_features: usize,
    base_score: f64,
    trees: Vec<RegressionTree>,
    gain_importance: Vec<f64>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbmParams,
    nodes: Vec<Node>,
    goes_left: Vec<bool>,
    gain_importance: &'a mut [f64],
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// `sorted[f]` lists the node's rows ordered by feature `f`.
    fn build(&mut self, sorted: Vec<Vec<usize>>, depth: usize) -> usize {
        let rows = &sorted[0];
        let (g, h) = rows
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]));
        let leaf_value = -g / (h + self.params.lambda);
        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: leaf_value });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf {
            return node_idx;
        }
        let Some(choice) = self.best_split(&sorted, g, h) else {
            return node_idx;
        };
        self.gain_importance[choice.feature] += choice.gain;

        for &i in rows {
            self.goes_left[i] = self.x[i][choice.feature] <= choice.threshold;
        }
        let (left, right): (Vec<Vec<usize>>, Vec<Vec<usize>>) = sorted
            .into_iter()
            .map(|order| -> (Vec<usize>, Vec<usize>) {
                order.into_iter().partition(|&i| self.goes_left[i])
            })
            .unzip();

        let left_idx = self.build(left, depth + 1);
        let right_idx = self.build(right, depth + 1);
        self.nodes[node_idx] = Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left: left_idx,
            right: right_idx,
        };
        node_idx
    }

    fn best_split(&self, sorted: &[Vec<usize>], g: f64, h: f64) -> Option<SplitChoice> {
        let lambda = self.params.lambda;
        let min_leaf = self.params.min_samples_leaf;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<SplitChoice> = None;

        for (feature, order) in sorted.iter().enumerate() {
            let n = order.len();
            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..n - 1 {
                let i = order[pos];
                gl += self.grad[i];
                hl += self.hess[i];
                let left_count = pos + 1;
                if left_count < min_leaf || n - left_count < min_leaf {
                    continue;
                }
                let here = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if here >= next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                let gain =
                    0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score);
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some(SplitChoice {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GbmClassifier {
    /// Fit on row-major features `x` and 0/1 labels `y`.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &GbmParams) -> Result<Self> {
        params.validate()?;
        ensure!(!x.is_empty(), "cannot fit on an empty training set");
        ensure!(
            x.len() == y.len(),
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        );
        let n_features = x[0].len();
        ensure!(n_features > 0, "feature rows are empty");
        if let Some(bad) = x.iter().position(|row| row.len() != n_features) {
            return Err(anyhow!(
                "row {bad} has {} features, expected {n_features}",
                x[bad].len()
            ));
        }
        ensure!(
            x.iter().flatten().all(|value| value.is_finite()),
            "training features must be finite"
        );
        ensure!(y.iter().all(|&label| label <= 1), "labels must be 0 or 1");

        let n = x.len();
        let targets: Vec<f64> = y.iter().map(|&label| f64::from(label)).collect();
        let rate = (targets.iter().sum::<f64>() / n as f64).clamp(BASE_RATE_EPS, 1.0 - BASE_RATE_EPS);
        let base_score = (rate / (1.0 - rate)).ln();

        let presorted: Vec<Vec<usize>> = (0..n_features)
            .map(|feature| {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]).then(a.cmp(&b)));
                order
            })
            .collect();

        let mut raw = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut gain_importance = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(raw[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }
            let mut builder = TreeBuilder {
                x,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
                goes_left: vec![false; n],
                gain_importance: &mut gain_importance,
            };
            builder.build(presorted.clone(), 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };
            for (score, row) in raw.iter_mut().zip(x.iter()) {
                *score += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            params: *params,
            n_features,
            base_score,
            trees,
            gain_importance,
        })
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Raw log-odds score for one row.
    pub fn decision_function(&self, row: &[f64]) -> Result<f64> {
        ensure!(
            row.len() == self.n_features,
            "row has {} features, model expects {}",
            row.len(),
            self.n_features
        );
        Ok(self.base_score
            + self.params.learning_rate
                * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>())
    }

    /// Probability of class 1.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        Ok(sigmoid(self.decision_function(row)?))
    }

    /// Class 1 only when its probability strictly exceeds one half.
    pub fn predict(&self, row: &[f64]) -> Result<u8> {
        Ok(u8::from(self.decision_function(row)? > 0.0))
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Total split gain per feature, normalised to sum to one. All zeros when
    /// no split was ever made.
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.gain_importance.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.n_features];
        }
        self.gain_importance.iter().map(|gain| gain / total).collect()
    }

    /// Structural checks for a deserialized model.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        ensure!(self.base_score.is_finite(), "base score is not finite");
        ensure!(
            self.gain_importance.len() == self.n_features,
            "importance vector has {} entries for {} features",
            self.gain_importance.len(),
            self.n_features
        );
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|err| anyhow!("tree {idx}: {err}"))?;
        }
        Ok(())
    }
}
