pub mod artifacts;
pub mod baseline;
pub mod cv;
pub mod ensemble;
pub mod evaluate;
pub mod gbt;
pub mod pipeline;
pub mod search;
pub mod svm;
pub mod train;

use crate::dataset::FeatureRow;

/// A fitted binary classifier over feature vectors.
pub trait Classifier {
    /// Probability of the positive class for each row.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64>;

    fn predict(&self, x: &[Vec<f64>]) -> Vec<i32> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| i32::from(p >= 0.5))
            .collect()
    }
}

/// Feature matrix with labels and the season of each row, used for fold assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<i32>,
    pub seasons: Vec<i32>,
}

impl Samples {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        let mut out = Samples::default();
        for r in rows {
            out.x.push(r.features());
            out.y.push(r.target);
            out.seasons.push(r.season);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn subset(&self, idx: &[usize]) -> Self {
        Samples {
            x: idx.iter().map(|&i| self.x[i].clone()).collect(),
            y: idx.iter().map(|&i| self.y[i]).collect(),
            seasons: idx.iter().map(|&i| self.seasons[i]).collect(),
        }
    }

    pub fn concat(&self, other: &Samples) -> Self {
        let mut out = self.clone();
        out.x.extend(other.x.iter().cloned());
        out.y.extend_from_slice(&other.y);
        out.seasons.extend_from_slice(&other.seasons);
        out
    }

    pub fn positive_rate(&self) -> f64 {
        if self.y.is_empty() {
            return 0.5;
        }
        self.y.iter().filter(|&&y| y == 1).count() as f64 / self.y.len() as f64
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
