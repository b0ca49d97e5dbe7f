use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::baseline::{BaselineModel, BaselineParams};
use super::gbt::{GbtModel, GbtParams};
use super::svm::{SvmModel, SvmParams};
use super::{Classifier, Samples};

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let width = x.first().map_or(0, |r| r.len());
        let n = x.len().max(1) as f64;
        let mut mean = vec![0.0_f64; width];
        for row in x {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut var = vec![0.0_f64; width];
        for row in x {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns pass through centered but unscaled.
        let scale = var
            .into_iter()
            .map(|v| if v > 1e-24 { v.sqrt() } else { 1.0 })
            .collect();
        Self { mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter().map(|row| self.transform_row(row)).collect()
    }
}

/// Estimator choice and its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Baseline(BaselineParams),
    Svc(SvmParams),
    Gbt(GbtParams),
}

impl ModelSpec {
    /// Artifact name under which a model of this kind is stored.
    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::Baseline(_) => "baseline",
            ModelSpec::Svc(_) => "svc",
            ModelSpec::Gbt(_) => "gbt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Baseline(BaselineModel),
    Svc(SvmModel),
    Gbt(GbtModel),
}

impl Estimator {
    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Estimator::Baseline(m) => m,
            Estimator::Svc(m) => m,
            Estimator::Gbt(m) => m,
        }
    }
}

/// A scaler fitted on the training rows followed by the fitted estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub spec: ModelSpec,
    pub scaler: StandardScaler,
    pub estimator: Estimator,
}

impl Pipeline {
    pub fn fit(spec: &ModelSpec, data: &Samples) -> Result<Self> {
        let scaler = StandardScaler::fit(&data.x);
        let scaled = Samples {
            x: scaler.transform(&data.x),
            y: data.y.clone(),
            seasons: data.seasons.clone(),
        };
        let estimator = match spec {
            ModelSpec::Baseline(p) => Estimator::Baseline(BaselineModel::fit(p, &scaled)),
            ModelSpec::Svc(p) => Estimator::Svc(SvmModel::fit(p, &scaled)?),
            ModelSpec::Gbt(p) => Estimator::Gbt(GbtModel::fit(p, &scaled)?),
        };
        Ok(Self {
            spec: *spec,
            scaler,
            estimator,
        })
    }

    pub fn name(&self) -> &'static str {
        self.spec.name()
    }
}

impl Classifier for Pipeline {
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        self.estimator
            .as_classifier()
            .predict_proba(&self.scaler.transform(x))
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<i32> {
        self.estimator
            .as_classifier()
            .predict(&self.scaler.transform(x))
    }
}
