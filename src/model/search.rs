//! Seeded random hyperparameter search with early stopping.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::Samples;
use super::baseline::{BaselineParams, BaselineStrategy};
use super::cv::{Fold, cross_validate};
use super::evaluate::ScoringMetric;
use super::gbt::GbtParams;
use super::pipeline::ModelSpec;
use super::svm::SvmParams;

#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub metric: ScoringMetric,
    pub max_evals: usize,
    /// Consecutive trials without improvement before the search stops.
    pub early_stop_n: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub spec: ModelSpec,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub best: ModelSpec,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

fn log_uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    rng.gen_range(lo.ln()..=hi.ln()).exp()
}

/// Draws a spec of the same kind as `base`; fields outside the search space keep their
/// base values.
pub fn sample_spec(base: &ModelSpec, rng: &mut StdRng) -> ModelSpec {
    match base {
        ModelSpec::Baseline(_) => ModelSpec::Baseline(BaselineParams {
            strategy: if rng.gen_bool(0.5) {
                BaselineStrategy::HomeField
            } else {
                BaselineStrategy::MostFrequent
            },
        }),
        ModelSpec::Svc(p) => ModelSpec::Svc(SvmParams {
            c: log_uniform(rng, 1e-2, 1e2),
            gamma: Some(log_uniform(rng, 1e-3, 1.0)),
            ..*p
        }),
        ModelSpec::Gbt(p) => ModelSpec::Gbt(GbtParams {
            n_estimators: rng.gen_range(1..=8) * 50,
            learning_rate: log_uniform(rng, 0.01, 0.3),
            max_depth: rng.gen_range(2..=6),
            min_samples_leaf: rng.gen_range(5..=100),
            lambda: log_uniform(rng, 1e-3, 10.0),
            subsample: rng.gen_range(0.5..=1.0),
            ..*p
        }),
    }
}

fn mean_score(spec: &ModelSpec, data: &Samples, folds: &[Fold], metric: ScoringMetric) -> Result<f64> {
    let scores = cross_validate(spec, data, folds)?;
    let n = scores.len().max(1) as f64;
    Ok(scores
        .iter()
        .map(|s| metric.pick(&s.metrics))
        .sum::<f64>()
        / n)
}

/// Evaluates `base` first, then random draws, keeping the spec with the best mean
/// cross-validated score. Stops after `max_evals` trials or `early_stop_n` trials in a
/// row without improvement.
pub fn random_search(
    base: &ModelSpec,
    data: &Samples,
    folds: &[Fold],
    cfg: &SearchConfig,
) -> Result<SearchResult> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut trials = Vec::new();
    let mut best = *base;
    let mut best_score = f64::NEG_INFINITY;
    let mut since_best = 0usize;

    for trial in 0..cfg.max_evals.max(1) {
        let spec = if trial == 0 {
            *base
        } else {
            sample_spec(base, &mut rng)
        };
        let score = mean_score(&spec, data, folds, cfg.metric)?;
        debug!(trial, score, model = spec.name(), "search trial");
        trials.push(Trial { spec, score });

        if score > best_score {
            best_score = score;
            best = spec;
            since_best = 0;
        } else {
            since_best += 1;
            if cfg.early_stop_n > 0 && since_best >= cfg.early_stop_n {
                info!(trial, "search stopped early");
                break;
            }
        }
    }

    info!(
        model = best.name(),
        metric = %cfg.metric,
        best_score,
        trials = trials.len(),
        "search finished"
    );
    Ok(SearchResult {
        best,
        best_score,
        trials,
    })
}
