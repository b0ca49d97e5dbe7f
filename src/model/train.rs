use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::artifacts::save_model;
use super::cv::{Fold, FoldScore, cross_validate, walk_forward_folds};
use super::ensemble::member_specs;
use super::evaluate::{FeatureImportance, TestScores, compile_scores, permutation_importance};
use super::pipeline::{ModelSpec, Pipeline};
use super::search::{SearchConfig, SearchResult, random_search};
use super::{Classifier, Samples};
use crate::config::TrainingConfig;
use crate::dataset::FEATURE_NAMES;
use crate::report;

pub const IMPORTANCE_REPEATS: usize = 10;

/// Creates `<results_dir>/<YYYYmmddHHMMSS>` for one training run.
pub fn make_save_path(results_dir: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
    let path = results_dir.join(stamp);
    fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
    Ok(path)
}

pub struct TrainOutcome {
    pub name: &'static str,
    pub spec: ModelSpec,
    pub search: Option<SearchResult>,
    pub cv_scores: Vec<FoldScore>,
    pub test_scores: TestScores,
    pub importances: Vec<FeatureImportance>,
    pub model_path: PathBuf,
}

/// Optionally searches hyperparameters, scores the spec with walk-forward CV, fits on
/// the training rows to score the holdout, then refits on everything and saves the
/// model under `save_dir`.
pub fn evaluate_train_save(
    spec: &ModelSpec,
    train: &Samples,
    test: &Samples,
    folds: &[Fold],
    cfg: &TrainingConfig,
    hyperopt: bool,
    save_dir: &Path,
) -> Result<TrainOutcome> {
    let name = spec.name();
    info!(model = name, hyperopt, "evaluating on training and holdout data");

    let search = if hyperopt {
        let search_cfg = SearchConfig {
            metric: cfg.scoring,
            max_evals: cfg.max_evals,
            early_stop_n: cfg.early_stop_n,
            seed: cfg.seed,
        };
        Some(random_search(spec, train, folds, &search_cfg)?)
    } else {
        None
    };
    let spec = search.as_ref().map_or(*spec, |s| s.best);

    let cv_scores = cross_validate(&spec, train, folds)?;
    report::write_cv_scores_csv(&save_dir.join(format!("{name}_scores.csv")), &cv_scores)?;

    let model = Pipeline::fit(&spec, train).with_context(|| format!("fit {name} on train"))?;
    let importances = permutation_importance(
        &model,
        &test.x,
        &test.y,
        &FEATURE_NAMES,
        cfg.scoring,
        IMPORTANCE_REPEATS,
        cfg.seed,
    );
    let probs = model.predict_proba(&test.x);
    let labels = model.predict(&test.x);
    let test_scores = compile_scores(&test.y, &labels, &probs);
    info!(
        model = name,
        accuracy = test_scores.metrics.accuracy,
        log_loss = test_scores.metrics.log_loss,
        "holdout scores"
    );

    let report = report::export_training_report(
        &save_dir.join(format!("{name}_report.xlsx")),
        name,
        &cv_scores,
        &test_scores,
        &importances,
        search.as_ref(),
    )?;
    info!(
        model = name,
        folds = report.folds,
        calibration_bins = report.calibration_bins,
        importances = report.importances,
        trials = report.trials,
        "training report written"
    );

    info!(model = name, "training on all data");
    let full = train.concat(test);
    let final_model = Pipeline::fit(&spec, &full).with_context(|| format!("fit {name} on all data"))?;
    let model_path = save_dir.join(format!("{name}_model.json"));
    save_model(&model_path, &final_model)?;

    Ok(TrainOutcome {
        name,
        spec,
        search,
        cv_scores,
        test_scores,
        importances,
        model_path,
    })
}

/// Trains every ensemble member into a fresh timestamped results directory. The
/// baseline is scored as-is; the other members are searched first.
pub fn run_training(
    train: &Samples,
    test: &Samples,
    cfg: &TrainingConfig,
    results_dir: &Path,
) -> Result<(PathBuf, Vec<TrainOutcome>)> {
    let save_dir = make_save_path(results_dir)?;
    let folds = walk_forward_folds(
        &train.seasons,
        cfg.cv_train_size,
        cfg.cv_test_size,
        cfg.cv_shift_size,
    )?;
    info!(folds = folds.len(), dir = %save_dir.display(), "starting training run");

    let mut outcomes = Vec::new();
    for spec in member_specs(cfg.seed) {
        let hyperopt = !matches!(spec, ModelSpec::Baseline(_));
        outcomes.push(evaluate_train_save(
            &spec, train, test, &folds, cfg, hyperopt, &save_dir,
        )?);
    }
    Ok((save_dir, outcomes))
}
