use anyhow::{Context, Result};

use nfl_forecast::config::{Config, arg_value, has_flag};
use nfl_forecast::model::ensemble::VoteMode;
use nfl_forecast::stages;

/// Runs every stage in order: ingest, dataset build, training, prediction.
///
/// `--offline` skips the schedule refresh and page fetches and works from the local
/// caches. `--skip-train` goes straight from the dataset to prediction.
fn main() -> Result<()> {
    nfl_forecast::init_tracing();
    let mut cfg = Config::from_env()?;
    cfg.apply_path_args();
    let vote = arg_value("--vote")
        .as_deref()
        .unwrap_or("soft")
        .parse::<VoteMode>()
        .context("invalid --vote")?;
    let offline = has_flag("--offline");

    let ingest = stages::ingest(&cfg, !offline, !offline)?;
    println!("Ingest complete");
    println!("Schedule rows: {}", ingest.schedule_rows);
    println!(
        "Pages fetched: {} (cached {}, failed {})",
        ingest.fetch.fetched,
        ingest.fetch.already_cached,
        ingest.fetch.errors.len()
    );
    println!(
        "Pages parsed: {} (failed {})",
        ingest.parsed,
        ingest.parse_errors.len()
    );

    let dataset = stages::build_dataset(&cfg)?;
    println!(
        "Dataset: train={} test={} dropped={}",
        dataset.train_rows, dataset.test_rows, dataset.build.dropped_missing
    );

    if !has_flag("--skip-train") {
        let (dir, outcomes) = stages::train(&cfg)?;
        println!("Training results: {}", dir.display());
        for out in &outcomes {
            println!(
                "{}: holdout accuracy={:.3} log_loss={:.4}",
                out.name, out.test_scores.metrics.accuracy, out.test_scores.metrics.log_loss
            );
        }
    }

    let predicted = stages::predict(&cfg, vote)?;
    println!("Predictions ({vote} vote): {}", predicted.path.display());
    println!("Rows: {}", predicted.rows);
    if let Some(acc) = predicted.accuracy {
        println!("Accuracy: {acc:.3}");
    }
    Ok(())
}
