//! Gradient-boosted regression trees on the logistic loss.

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{Classifier, Samples, sigmoid};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub lambda: f64,
    /// Fraction of rows drawn without replacement for each tree.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 20,
            lambda: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
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
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
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
}

struct Grow<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbtParams,
    nodes: Vec<Node>,
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Grow<'_> {
    fn leaf_value(&self, idx: &[usize]) -> f64 {
        let g: f64 = idx.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = idx.iter().map(|&i| self.hess[i]).sum();
        -g / (h + self.params.lambda)
    }

    fn best_split(&self, idx: &[usize]) -> Option<SplitChoice> {
        let min_leaf = self.params.min_samples_leaf.max(1);
        if idx.len() < 2 * min_leaf {
            return None;
        }
        let lambda = self.params.lambda;
        let g_total: f64 = idx.iter().map(|&i| self.grad[i]).sum();
        let h_total: f64 = idx.iter().map(|&i| self.hess[i]).sum();
        let parent = g_total * g_total / (h_total + lambda);

        let n_features = self.x[idx[0]].len();
        let mut best: Option<SplitChoice> = None;
        let mut order = idx.to_vec();
        for feature in 0..n_features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let (mut gl, mut hl) = (0.0_f64, 0.0_f64);
            for k in 1..order.len() {
                let prev = order[k - 1];
                gl += self.grad[prev];
                hl += self.hess[prev];
                if k < min_leaf || order.len() - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (self.x[prev][feature], self.x[order[k]][feature]);
                if lo >= hi {
                    continue;
                }
                let (gr, hr) = (g_total - gl, h_total - hl);
                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: (lo + hi) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let at = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(&idx),
        });
        if depth >= self.params.max_depth {
            return at;
        }
        let Some(split) = self.best_split(&idx) else {
            return at;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[at] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbtModel {
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
}

impl GbtModel {
    pub fn fit(params: &GbtParams, data: &Samples) -> Result<Self> {
        let n = data.len();
        if n == 0 {
            bail!("cannot fit boosted trees on an empty training set");
        }
        let prior = data.positive_rate().clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();
        let mut raw = vec![base_score; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample.clamp(0.0, 1.0)).round() as usize).clamp(1, n);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(n);
            let mut hess = Vec::with_capacity(n);
            for (f, &y) in raw.iter().zip(&data.y) {
                let p = sigmoid(*f);
                grad.push(p - y as f64);
                hess.push((p * (1.0 - p)).max(1e-16));
            }
            let rows = if sample_size < n {
                let mut picked = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n).collect()
            };

            let mut grow = Grow {
                x: &data.x,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            };
            grow.grow(rows, 0);
            let tree = Tree { nodes: grow.nodes };
            for (f, row) in raw.iter_mut().zip(&data.x) {
                *f += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }
        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Classifier for GbtModel {
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| sigmoid(self.raw_score(row))).collect()
    }
}
