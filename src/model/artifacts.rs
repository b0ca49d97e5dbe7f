use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::Samples;
use super::pipeline::{ModelSpec, Pipeline};

pub fn model_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

pub fn save_model(path: &Path, model: &Pipeline) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create model dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(model).context("serialize model")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn load_model(path: &Path) -> Result<Pipeline> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse model {}", path.display()))
}

/// Loads `<dir>/<name>.json` when present; otherwise fits `spec` on `data` and saves it.
pub fn load_or_train(dir: &Path, spec: &ModelSpec, data: &Samples) -> Result<Pipeline> {
    let path = model_path(dir, spec.name());
    if path.exists() {
        info!(model = spec.name(), path = %path.display(), "loading saved model");
        return load_model(&path);
    }
    info!(model = spec.name(), rows = data.len(), "no saved model, training");
    let model = Pipeline::fit(spec, data).with_context(|| format!("train {}", spec.name()))?;
    save_model(&path, &model)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::baseline::BaselineParams;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nfl_forecast_{tag}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn load_or_train_saves_then_reuses() {
        let dir = temp_dir("artifacts");
        let spec = ModelSpec::Baseline(BaselineParams::default());
        let data = Samples {
            x: vec![vec![1.0], vec![0.0], vec![1.0], vec![0.0]],
            y: vec![1, 0, 1, 1],
            seasons: vec![2020; 4],
        };
        let trained = load_or_train(&dir, &spec, &data).unwrap();
        assert!(model_path(&dir, "baseline").exists());

        // Different data must not matter once the artifact exists.
        let other = Samples {
            x: vec![vec![1.0], vec![0.0]],
            y: vec![0, 0],
            seasons: vec![2020; 2],
        };
        let loaded = load_or_train(&dir, &spec, &other).unwrap();
        assert_eq!(loaded, trained);
        let _ = fs::remove_dir_all(&dir);
    }
}
