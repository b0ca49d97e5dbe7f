use anyhow::Result;

use nfl_forecast::config::Config;
use nfl_forecast::stages;

fn main() -> Result<()> {
    nfl_forecast::init_tracing();
    let mut cfg = Config::from_env()?;
    cfg.apply_path_args();

    let summary = stages::build_dataset(&cfg)?;

    println!("Dataset build complete");
    println!("DB: {}", cfg.paths.train_db.display());
    println!("Null policy: {}", cfg.null_policy);
    println!("Game rows: {}", summary.build.game_rows);
    println!("Outside training range: {}", summary.build.out_of_range);
    println!("Dropped for missing features: {}", summary.build.dropped_missing);
    println!(
        "Train rows: {} (seasons {}..{})",
        summary.train_rows, cfg.training.min_year, cfg.training.holdout_year_start
    );
    println!("Test rows: {}", summary.test_rows);
    Ok(())
}
