use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::Classifier;

/// Metric maximized during search. Losses are negated so larger is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMetric {
    Accuracy,
    NegLogLoss,
    NegBrier,
    RocAuc,
}

impl ScoringMetric {
    pub fn score(self, probs: &[f64], y: &[i32]) -> f64 {
        self.pick(&evaluate_probs(probs, y))
    }

    pub fn pick(self, m: &Metrics) -> f64 {
        match self {
            ScoringMetric::Accuracy => m.accuracy,
            ScoringMetric::NegLogLoss => -m.log_loss,
            ScoringMetric::NegBrier => -m.brier,
            ScoringMetric::RocAuc => m.roc_auc,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoringMetric::Accuracy => "accuracy",
            ScoringMetric::NegLogLoss => "neg_log_loss",
            ScoringMetric::NegBrier => "neg_brier_score",
            ScoringMetric::RocAuc => "roc_auc",
        }
    }
}

impl FromStr for ScoringMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accuracy" => Ok(ScoringMetric::Accuracy),
            "neg_log_loss" | "log_loss" => Ok(ScoringMetric::NegLogLoss),
            "neg_brier_score" | "neg_brier" | "brier" => Ok(ScoringMetric::NegBrier),
            "roc_auc" | "auc" => Ok(ScoringMetric::RocAuc),
            other => bail!("unknown scoring metric {other:?}"),
        }
    }
}

impl fmt::Display for ScoringMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
    pub roc_auc: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
            roc_auc: 0.5,
        }
    }
}

pub fn evaluate_probs(probs: &[f64], y: &[i32]) -> Metrics {
    if probs.is_empty() || probs.len() != y.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;
    for (&p, &label) in probs.iter().zip(y) {
        let target = if label == 1 { 1.0 } else { 0.0 };
        brier_sum += (p - target).powi(2);
        let actual_prob = if label == 1 { p } else { 1.0 - p }.clamp(1e-15, 1.0);
        log_loss_sum += -actual_prob.ln();
        if i32::from(p >= 0.5) == label {
            correct += 1;
        }
    }

    let n = probs.len() as f64;
    Metrics {
        samples: probs.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
        roc_auc: roc_auc(probs, y),
    }
}

/// Area under the ROC curve from rank statistics, with tied scores sharing their
/// average rank. 0.5 when only one class is present.
pub fn roc_auc(probs: &[f64], y: &[i32]) -> f64 {
    let mut order = (0..probs.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut ranks = vec![0.0_f64; probs.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let n_pos = y.iter().filter(|&&v| v == 1).count();
    let n_neg = y.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }
    let rank_sum: f64 = ranks
        .iter()
        .zip(y)
        .filter(|(_, label)| **label == 1)
        .map(|(r, _)| *r)
        .sum();
    let n_pos = n_pos as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn calibration_bins(probs: &[f64], y: &[i32], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (&p, &label) in probs.iter().zip(y) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if label == 1 {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Held-out scores for a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestScores {
    pub metrics: Metrics,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
    pub calibration: Vec<CalibrationBin>,
}

pub fn compile_scores(y: &[i32], pred: &[i32], probs: &[f64]) -> TestScores {
    let mut scores = TestScores {
        metrics: evaluate_probs(probs, y),
        true_positive: 0,
        false_positive: 0,
        true_negative: 0,
        false_negative: 0,
        calibration: calibration_bins(probs, y, 10),
    };
    for (&actual, &guess) in y.iter().zip(pred) {
        match (actual == 1, guess == 1) {
            (true, true) => scores.true_positive += 1,
            (false, true) => scores.false_positive += 1,
            (false, false) => scores.true_negative += 1,
            (true, false) => scores.false_negative += 1,
        }
    }
    scores
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub mean: f64,
    pub std: f64,
}

/// Drop in `metric` when each feature column is shuffled, averaged over `repeats`.
pub fn permutation_importance(
    model: &dyn Classifier,
    x: &[Vec<f64>],
    y: &[i32],
    feature_names: &[&str],
    metric: ScoringMetric,
    repeats: usize,
    seed: u64,
) -> Vec<FeatureImportance> {
    let base = metric.score(&model.predict_proba(x), y);
    let mut rng = StdRng::seed_from_u64(seed);
    let repeats = repeats.max(1);

    feature_names
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let mut drops = Vec::with_capacity(repeats);
            for _ in 0..repeats {
                let mut column = x.iter().map(|row| row[col]).collect::<Vec<_>>();
                column.shuffle(&mut rng);
                let permuted = x
                    .iter()
                    .zip(&column)
                    .map(|(row, &v)| {
                        let mut row = row.clone();
                        row[col] = v;
                        row
                    })
                    .collect::<Vec<_>>();
                drops.push(base - metric.score(&model.predict_proba(&permuted), y));
            }
            let mean = drops.iter().sum::<f64>() / repeats as f64;
            let var = drops.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / repeats as f64;
            FeatureImportance {
                feature: (*name).to_string(),
                mean,
                std: var.sqrt(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstColumn;

    impl Classifier for FirstColumn {
        fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
            x.iter().map(|r| if r[0] > 0.0 { 0.9 } else { 0.1 }).collect()
        }
    }

    #[test]
    fn perfect_predictions_score_well() {
        let m = evaluate_probs(&[1.0, 0.0, 1.0], &[1, 0, 1]);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!(m.log_loss < 1e-9);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.roc_auc, 1.0);
    }

    #[test]
    fn auc_handles_ties_and_single_class() {
        assert_eq!(roc_auc(&[0.5, 0.5], &[1, 0]), 0.5);
        assert_eq!(roc_auc(&[0.2, 0.9], &[1, 1]), 0.5);
        assert!((roc_auc(&[0.1, 0.4, 0.35, 0.8], &[0, 0, 1, 1]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn metric_names_round_trip() {
        for m in [
            ScoringMetric::Accuracy,
            ScoringMetric::NegLogLoss,
            ScoringMetric::NegBrier,
            ScoringMetric::RocAuc,
        ] {
            assert_eq!(m.to_string().parse::<ScoringMetric>().unwrap(), m);
        }
        assert!("f1".parse::<ScoringMetric>().is_err());
    }

    #[test]
    fn calibration_bins_cover_unit_interval() {
        let bins = calibration_bins(&[0.05, 0.95, 1.0, 0.5], &[0, 1, 1, 0], 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[9].count, 2);
        assert_eq!(bins[9].actual_rate, 1.0);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 4);
    }

    #[test]
    fn confusion_counts_add_up() {
        let s = compile_scores(&[1, 0, 1, 0], &[1, 1, 0, 0], &[0.8, 0.6, 0.3, 0.2]);
        assert_eq!(
            (s.true_positive, s.false_positive, s.false_negative, s.true_negative),
            (1, 1, 1, 1)
        );
    }

    #[test]
    fn shuffling_an_unused_column_costs_nothing() {
        let x = (0..40)
            .map(|i| vec![if i % 2 == 0 { 1.0 } else { -1.0 }, i as f64])
            .collect::<Vec<_>>();
        let y = (0..40).map(|i| i32::from(i % 2 == 0)).collect::<Vec<_>>();
        let imp = permutation_importance(
            &FirstColumn,
            &x,
            &y,
            &["signal", "noise"],
            ScoringMetric::Accuracy,
            5,
            7,
        );
        assert!(imp[0].mean > 0.0);
        assert_eq!(imp[1].mean, 0.0);
    }
}
