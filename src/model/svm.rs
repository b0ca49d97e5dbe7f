//! RBF-kernel support vector classifier trained with SMO, with Platt-scaled probabilities.

use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Classifier, Samples};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub c: f64,
    /// Kernel width; `None` uses `1 / n_features`.
    pub gamma: Option<f64>,
    pub tol: f64,
    /// Consecutive sweeps without an update before stopping.
    pub max_passes: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tol: 1e-3,
            max_passes: 5,
            max_iter: 200,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmModel {
    pub support: Vec<Vec<f64>>,
    /// `alpha_i * y_i` for each support vector.
    pub coef: Vec<f64>,
    pub bias: f64,
    pub gamma: f64,
    pub platt_a: f64,
    pub platt_b: f64,
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * d2).exp()
}

impl SvmModel {
    pub fn fit(params: &SvmParams, data: &Samples) -> Result<Self> {
        let n = data.len();
        let positives = data.y.iter().filter(|&&y| y == 1).count();
        if positives == 0 || positives == n {
            bail!("svm needs both classes in the training data ({n} rows, {positives} positive)");
        }
        let n_features = data.x[0].len().max(1);
        let gamma = params.gamma.unwrap_or(1.0 / n_features as f64);
        let c = params.c;
        let x = &data.x;
        let y = data
            .y
            .iter()
            .map(|&v| if v == 1 { 1.0 } else { -1.0 })
            .collect::<Vec<f64>>();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut alpha = vec![0.0_f64; n];
        let mut bias = 0.0_f64;
        // f(x_i) - y_i, with f starting at zero.
        let mut errors = y.iter().map(|v| -v).collect::<Vec<f64>>();

        let mut passes = 0usize;
        let mut iter = 0usize;
        while passes < params.max_passes && iter < params.max_iter {
            let mut changed = 0usize;
            for i in 0..n {
                let e_i = errors[i];
                let violates = (y[i] * e_i < -params.tol && alpha[i] < c)
                    || (y[i] * e_i > params.tol && alpha[i] > 0.0);
                if !violates {
                    continue;
                }
                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let e_j = errors[j];
                let (ai_old, aj_old) = (alpha[i], alpha[j]);
                let (lo, hi) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if (hi - lo).abs() < 1e-12 {
                    continue;
                }
                let k_ij = rbf(&x[i], &x[j], gamma);
                // k_ii = k_jj = 1 for the RBF kernel.
                let eta = 2.0 * k_ij - 2.0;
                if eta >= 0.0 {
                    continue;
                }
                let aj_new = (aj_old - y[j] * (e_i - e_j) / eta).clamp(lo, hi);
                if (aj_new - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai_new = ai_old + y[i] * y[j] * (aj_old - aj_new);
                let (d_i, d_j) = (ai_new - ai_old, aj_new - aj_old);

                let b1 = bias - e_i - y[i] * d_i - y[j] * d_j * k_ij;
                let b2 = bias - e_j - y[i] * d_i * k_ij - y[j] * d_j;
                let b_new = if ai_new > 0.0 && ai_new < c {
                    b1
                } else if aj_new > 0.0 && aj_new < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                let db = b_new - bias;
                for (k, err) in errors.iter_mut().enumerate() {
                    *err += y[i] * d_i * rbf(&x[i], &x[k], gamma)
                        + y[j] * d_j * rbf(&x[j], &x[k], gamma)
                        + db;
                }
                alpha[i] = ai_new;
                alpha[j] = aj_new;
                bias = b_new;
                changed += 1;
            }
            iter += 1;
            if changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        let decision = errors.iter().zip(&y).map(|(e, t)| e + t).collect::<Vec<_>>();
        let (platt_a, platt_b) = fit_platt(&decision, &data.y);

        let mut support = Vec::new();
        let mut coef = Vec::new();
        for i in 0..n {
            if alpha[i] > 1e-8 {
                support.push(x[i].clone());
                coef.push(alpha[i] * y[i]);
            }
        }
        Ok(Self {
            support,
            coef,
            bias,
            gamma,
            platt_a,
            platt_b,
        })
    }

    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.support
            .iter()
            .zip(&self.coef)
            .map(|(sv, c)| c * rbf(sv, row, self.gamma))
            .sum::<f64>()
            + self.bias
    }
}

impl Classifier for SvmModel {
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| platt_prob(self.decision_function(row), self.platt_a, self.platt_b))
            .collect()
    }
}

/// `P(y = 1 | f) = 1 / (1 + exp(A f + B))`.
pub fn platt_prob(f: f64, a: f64, b: f64) -> f64 {
    let z = f * a + b;
    if z >= 0.0 {
        (-z).exp() / (1.0 + (-z).exp())
    } else {
        1.0 / (1.0 + z.exp())
    }
}

/// Fits Platt's sigmoid by Newton's method with backtracking, on regularized targets.
pub fn fit_platt(decision: &[f64], labels: &[i32]) -> (f64, f64) {
    let prior1 = labels.iter().filter(|&&l| l == 1).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets = labels
        .iter()
        .map(|&l| if l == 1 { hi_target } else { lo_target })
        .collect::<Vec<_>>();

    let objective = |a: f64, b: f64| -> f64 {
        decision
            .iter()
            .zip(&targets)
            .map(|(f, t)| {
                let z = f * a + b;
                if z >= 0.0 {
                    t * z + (1.0 + (-z).exp()).ln()
                } else {
                    (t - 1.0) * z + (1.0 + z.exp()).ln()
                }
            })
            .sum()
    };

    let sigma = 1e-12;
    let mut a = 0.0_f64;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21) = (sigma, sigma, 0.0_f64);
        let (mut g1, mut g2) = (0.0_f64, 0.0_f64);
        for (f, t) in decision.iter().zip(&targets) {
            let z = f * a + b;
            let (p, q) = if z >= 0.0 {
                let e = (-z).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = z.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0_f64;
        while step >= 1e-10 {
            let (na, nb) = (a + step * da, b + step * db);
            let nf = objective(na, nb);
            if nf < fval + 1e-4 * step * gd {
                a = na;
                b = nb;
                fval = nf;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            break;
        }
    }
    (a, b)
}
