//! The pipeline stages the binaries run: ingest, dataset build, training and prediction.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::boxscore::{self, FetchSummary};
use crate::config::Config;
use crate::dataset::{self, BuildSummary};
use crate::games::{clean_raw_games, transform_home_away};
use crate::model::Samples;
use crate::model::artifacts::model_path;
use crate::model::ensemble::{VoteMode, load_or_train_members, predict_rows};
use crate::model::train::{TrainOutcome, run_training};
use crate::report::write_predictions_csv;
use crate::schedule::{load_raw_games, refresh_games_data};
use crate::store::{self, FeatureTable};

pub struct IngestSummary {
    pub schedule_rows: usize,
    pub fetch: FetchSummary,
    pub parsed: usize,
    pub parse_errors: Vec<String>,
    pub player_offense: usize,
    pub team_stats: usize,
    pub drives: usize,
    pub starters: usize,
}

/// Refreshes the schedule, fetches missing box-score pages, then replaces the
/// box-score tables with everything parsed from the page cache.
pub fn ingest(cfg: &Config, refresh_schedule: bool, fetch_pages: bool) -> Result<IngestSummary> {
    let schedule_rows = if refresh_schedule {
        refresh_games_data(&cfg.games_url, &cfg.paths.raw_games)?
    } else {
        load_raw_games(&cfg.paths.raw_games)?.len()
    };

    let fetch = if fetch_pages {
        let raw = load_raw_games(&cfg.paths.raw_games)?;
        let ids = clean_raw_games(&raw)
            .into_iter()
            .filter(|g| g.season >= cfg.training.min_year)
            .filter_map(|g| g.pfr)
            .collect::<Vec<_>>();
        boxscore::fetch_missing_boxscores(
            &ids,
            &cfg.paths.boxscore_html_dir,
            Duration::from_secs_f64(cfg.fetch_delay_secs),
        )?
    } else {
        FetchSummary::default()
    };

    std::fs::create_dir_all(&cfg.paths.boxscore_html_dir).with_context(|| {
        format!("create boxscore dir {}", cfg.paths.boxscore_html_dir.display())
    })?;
    let parsed = boxscore::parse_boxscore_dir(&cfg.paths.boxscore_html_dir)?;
    let mut conn = store::open_db(&cfg.paths.boxscore_db)?;
    store::write_boxscore_tables(&mut conn, &parsed.tables)?;
    info!(parsed = parsed.parsed, errors = parsed.errors.len(), "box-score tables written");

    let tables = &parsed.tables;
    Ok(IngestSummary {
        schedule_rows,
        fetch,
        parsed: parsed.parsed,
        player_offense: tables.player_offense.len(),
        team_stats: tables.team_stats.len(),
        drives: tables.drives.len(),
        starters: tables.starters.len(),
        parse_errors: parsed.errors,
    })
}

pub struct DatasetSummary {
    pub build: BuildSummary,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Builds the feature rows and replaces the `train` and `test` tables.
pub fn build_dataset(cfg: &Config) -> Result<DatasetSummary> {
    let raw = load_raw_games(&cfg.paths.raw_games)?;
    let games = transform_home_away(&clean_raw_games(&raw));
    let tables = {
        let conn = store::open_db(&cfg.paths.boxscore_db)?;
        store::load_boxscore_tables(&conn)?
    };
    info!(
        games = games.len(),
        drives = tables.drives.len(),
        "building features"
    );

    let (rows, build) =
        dataset::build_features(&games, &tables, cfg.training.min_year, cfg.null_policy)?;
    let (train, test) = dataset::split_by_season(rows, cfg.training.holdout_year_start);

    let mut conn = store::open_db(&cfg.paths.train_db)?;
    store::write_feature_table(&mut conn, FeatureTable::Train, &train)?;
    store::write_feature_table(&mut conn, FeatureTable::Test, &test)?;
    Ok(DatasetSummary {
        build,
        train_rows: train.len(),
        test_rows: test.len(),
    })
}

fn load_samples(cfg: &Config) -> Result<(Vec<dataset::FeatureRow>, Vec<dataset::FeatureRow>)> {
    let conn = store::open_db(&cfg.paths.train_db)?;
    let train = store::load_feature_table(&conn, FeatureTable::Train)?;
    let test = store::load_feature_table(&conn, FeatureTable::Test)?;
    Ok((train, test))
}

/// Runs a training pass, then promotes each refit model into the models directory so
/// the next prediction run picks it up.
pub fn train(cfg: &Config) -> Result<(PathBuf, Vec<TrainOutcome>)> {
    let (train, test) = load_samples(cfg)?;
    let (dir, outcomes) = run_training(
        &Samples::from_rows(&train),
        &Samples::from_rows(&test),
        &cfg.training,
        &cfg.paths.results_dir,
    )?;

    let models_dir = &cfg.paths.models_dir;
    std::fs::create_dir_all(models_dir)
        .with_context(|| format!("create model dir {}", models_dir.display()))?;
    for out in &outcomes {
        let dest = model_path(models_dir, out.name);
        std::fs::copy(&out.model_path, &dest)
            .with_context(|| format!("promote {} to {}", out.name, dest.display()))?;
    }
    info!(models = outcomes.len(), dir = %models_dir.display(), "models promoted");
    Ok((dir, outcomes))
}

pub struct PredictSummary {
    pub rows: usize,
    pub accuracy: Option<f64>,
    pub path: PathBuf,
}

/// Scores the test table with the saved (or freshly trained) models and writes the
/// predictions CSV.
pub fn predict(cfg: &Config, mode: VoteMode) -> Result<PredictSummary> {
    let (train, test) = load_samples(cfg)?;
    let models = load_or_train_members(
        &cfg.paths.models_dir,
        cfg.training.seed,
        &Samples::from_rows(&train),
    )?;
    let predictions = predict_rows(&models, &test, mode);
    write_predictions_csv(&cfg.paths.predictions, &predictions)?;

    let accuracy = (!predictions.is_empty()).then(|| {
        predictions
            .iter()
            .filter(|p| p.pred_label == p.target)
            .count() as f64
            / predictions.len() as f64
    });
    Ok(PredictSummary {
        rows: predictions.len(),
        accuracy,
        path: cfg.paths.predictions.clone(),
    })
}
