use anyhow::Result;

use nfl_forecast::config::Config;
use nfl_forecast::stages;

fn main() -> Result<()> {
    nfl_forecast::init_tracing();
    let mut cfg = Config::from_env()?;
    cfg.apply_path_args();

    let (dir, outcomes) = stages::train(&cfg)?;

    println!("Training complete");
    println!("Results: {}", dir.display());
    println!(
        "CV: train={} test={} shift={} scoring={}",
        cfg.training.cv_train_size,
        cfg.training.cv_test_size,
        cfg.training.cv_shift_size,
        cfg.training.scoring
    );
    for out in &outcomes {
        let cv_mean = if out.cv_scores.is_empty() {
            0.0
        } else {
            out.cv_scores
                .iter()
                .map(|s| cfg.training.scoring.pick(&s.metrics))
                .sum::<f64>()
                / out.cv_scores.len() as f64
        };
        let m = &out.test_scores.metrics;
        println!(
            "{}: cv {}={:.4} holdout acc={:.3} log_loss={:.4} brier={:.4} auc={:.3}",
            out.name, cfg.training.scoring, cv_mean, m.accuracy, m.log_loss, m.brier, m.roc_auc
        );
        if let Some(search) = &out.search {
            println!("  search: {} trials, best {:.4}", search.trials.len(), search.best_score);
        }
        for imp in out.importances.iter().take(3) {
            println!("  {}: {:+.4} (+/- {:.4})", imp.feature, imp.mean, imp.std);
        }
        println!("  model: {}", out.model_path.display());
    }
    Ok(())
}
