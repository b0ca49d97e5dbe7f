use anyhow::{Context, Result};

use nfl_forecast::config::{Config, arg_value};
use nfl_forecast::model::ensemble::VoteMode;
use nfl_forecast::stages;

fn main() -> Result<()> {
    nfl_forecast::init_tracing();
    let mut cfg = Config::from_env()?;
    cfg.apply_path_args();
    let vote = arg_value("--vote")
        .as_deref()
        .unwrap_or("soft")
        .parse::<VoteMode>()
        .context("invalid --vote")?;

    let summary = stages::predict(&cfg, vote)?;

    println!("Prediction complete");
    println!("Models: {}", cfg.paths.models_dir.display());
    println!("Vote: {vote}");
    println!("Rows: {}", summary.rows);
    match summary.accuracy {
        Some(acc) => println!("Accuracy: {acc:.3}"),
        None => println!("Accuracy: n/a"),
    }
    println!("Output: {}", summary.path.display());
    Ok(())
}
