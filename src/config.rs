use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::dataset::NullPolicy;
use crate::model::evaluate::ScoringMetric;

const DEFAULT_GAMES_URL: &str =
    "https://github.com/nflverse/nfldata/raw/master/data/games.csv";

#[derive(Debug, Clone)]
pub struct Paths {
    pub raw_games: PathBuf,
    pub boxscore_html_dir: PathBuf,
    pub boxscore_db: PathBuf,
    pub train_db: PathBuf,
    pub models_dir: PathBuf,
    pub results_dir: PathBuf,
    pub predictions: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            raw_games: PathBuf::from("data/raw/games.csv"),
            boxscore_html_dir: PathBuf::from("data/raw/pfr"),
            boxscore_db: PathBuf::from("data/boxscore_stats.db"),
            train_db: PathBuf::from("data/train.db"),
            models_dir: PathBuf::from("models"),
            results_dir: PathBuf::from("results"),
            predictions: PathBuf::from("data/predictions.csv"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub min_year: i32,
    pub holdout_year_start: i32,
    pub cv_train_size: usize,
    pub cv_test_size: usize,
    pub cv_shift_size: usize,
    pub scoring: ScoringMetric,
    pub max_evals: usize,
    pub early_stop_n: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_year: 2003,
            holdout_year_start: 2022,
            cv_train_size: 5,
            cv_test_size: 1,
            cv_shift_size: 1,
            scoring: ScoringMetric::NegLogLoss,
            max_evals: 50,
            early_stop_n: 15,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub games_url: String,
    pub paths: Paths,
    pub training: TrainingConfig,
    pub fetch_delay_secs: f64,
    pub null_policy: NullPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            games_url: DEFAULT_GAMES_URL.to_string(),
            paths: Paths::default(),
            training: TrainingConfig::default(),
            fetch_delay_secs: 6.0,
            null_policy: NullPolicy::Mixed,
        }
    }
}

impl Config {
    /// Loads `.env.local`/`.env` when present, then reads `NFL_*` overrides.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Config::default();

        if let Some(url) = get("NFL_GAMES_URL") {
            cfg.games_url = url.trim().to_string();
        }

        let paths = &mut cfg.paths;
        for (key, slot) in [
            ("NFL_RAW_GAMES_PATH", &mut paths.raw_games),
            ("NFL_BOXSCORE_HTML_DIR", &mut paths.boxscore_html_dir),
            ("NFL_BOXSCORE_DB", &mut paths.boxscore_db),
            ("NFL_TRAIN_DB", &mut paths.train_db),
            ("NFL_MODELS_DIR", &mut paths.models_dir),
            ("NFL_RESULTS_DIR", &mut paths.results_dir),
            ("NFL_PREDICTIONS_PATH", &mut paths.predictions),
        ] {
            if let Some(raw) = get(key) {
                *slot = PathBuf::from(raw.trim());
            }
        }

        let t = &mut cfg.training;
        parse_into(&get, "NFL_MIN_YEAR", &mut t.min_year)?;
        parse_into(&get, "NFL_HOLDOUT_YEAR", &mut t.holdout_year_start)?;
        parse_into(&get, "NFL_CV_TRAIN_SIZE", &mut t.cv_train_size)?;
        parse_into(&get, "NFL_CV_TEST_SIZE", &mut t.cv_test_size)?;
        parse_into(&get, "NFL_CV_SHIFT_SIZE", &mut t.cv_shift_size)?;
        parse_into(&get, "NFL_SCORING", &mut t.scoring)?;
        parse_into(&get, "NFL_MAX_EVALS", &mut t.max_evals)?;
        parse_into(&get, "NFL_EARLY_STOP_N", &mut t.early_stop_n)?;
        parse_into(&get, "NFL_SEED", &mut t.seed)?;
        parse_into(&get, "NFL_FETCH_DELAY_SECS", &mut cfg.fetch_delay_secs)?;
        parse_into(&get, "NFL_NULL_POLICY", &mut cfg.null_policy)?;

        if cfg.fetch_delay_secs < 0.0 {
            cfg.fetch_delay_secs = 0.0;
        }
        Ok(cfg)
    }

    /// Applies `--raw-games`, `--html-dir`, `--boxscore-db`, `--train-db`, `--models`,
    /// `--results` and `--out` path overrides from the process args.
    pub fn apply_path_args(&mut self) {
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        self.apply_args(&args);
    }

    fn apply_args(&mut self, args: &[String]) {
        let paths = &mut self.paths;
        for (flag, slot) in [
            ("--raw-games", &mut paths.raw_games),
            ("--html-dir", &mut paths.boxscore_html_dir),
            ("--boxscore-db", &mut paths.boxscore_db),
            ("--train-db", &mut paths.train_db),
            ("--models", &mut paths.models_dir),
            ("--results", &mut paths.results_dir),
            ("--out", &mut paths.predictions),
        ] {
            if let Some(raw) = find_arg_value(args, flag) {
                *slot = PathBuf::from(raw);
            }
        }
    }
}

fn parse_into<T>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = get(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid value for {key}: {raw:?}"))?;
    Ok(())
}

/// Returns the value of `--name=value` or `--name value` from the process args.
pub fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    find_arg_value(&args, name)
}

pub fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|a| a == name)
}

fn find_arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
