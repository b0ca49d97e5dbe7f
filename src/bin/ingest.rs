use anyhow::Result;

use nfl_forecast::config::{Config, has_flag};
use nfl_forecast::stages;

fn main() -> Result<()> {
    nfl_forecast::init_tracing();
    let mut cfg = Config::from_env()?;
    cfg.apply_path_args();

    let summary = stages::ingest(&cfg, !has_flag("--no-refresh"), !has_flag("--no-fetch"))?;

    println!("Box-score ingest complete");
    println!("Schedule: {} ({} rows)", cfg.paths.raw_games.display(), summary.schedule_rows);
    println!("DB: {}", cfg.paths.boxscore_db.display());
    println!(
        "Pages: requested={} cached={} fetched={}",
        summary.fetch.requested, summary.fetch.already_cached, summary.fetch.fetched
    );
    println!("Parsed: {}", summary.parsed);
    println!(
        "Rows: player_offense={} team_stats={} drives={} starters={}",
        summary.player_offense, summary.team_stats, summary.drives, summary.starters
    );

    let errors = summary
        .fetch
        .errors
        .iter()
        .chain(&summary.parse_errors)
        .collect::<Vec<_>>();
    if !errors.is_empty() {
        println!("  errors: {}", errors.len());
        for err in errors.iter().take(6) {
            println!("   - {err}");
        }
    }
    Ok(())
}
