use serde::{Deserialize, Serialize};

use super::{Classifier, Samples};

/// Column of the (scaled) feature vector marking a home row.
pub const HOME_COLUMN: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineStrategy {
    /// Predicts the training-set majority class for every row.
    MostFrequent,
    /// Predicts from the home indicator alone.
    HomeField,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineParams {
    pub strategy: BaselineStrategy,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            strategy: BaselineStrategy::HomeField,
        }
    }
}

/// Training frequencies of the positive class, overall and split by venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    pub strategy: BaselineStrategy,
    pub overall: f64,
    pub home: f64,
    pub away: f64,
}

impl BaselineModel {
    pub fn fit(params: &BaselineParams, data: &Samples) -> Self {
        let overall = data.positive_rate();
        let rate = |want_home: bool| {
            let (wins, n) = data
                .x
                .iter()
                .zip(&data.y)
                .filter(|(row, _)| is_home(row) == want_home)
                .fold((0usize, 0usize), |(w, n), (_, &y)| (w + usize::from(y == 1), n + 1));
            if n == 0 { overall } else { wins as f64 / n as f64 }
        };
        Self {
            strategy: params.strategy,
            overall,
            home: rate(true),
            away: rate(false),
        }
    }
}

fn is_home(row: &[f64]) -> bool {
    row.get(HOME_COLUMN).is_some_and(|v| *v > 0.0)
}

impl Classifier for BaselineModel {
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| match self.strategy {
                BaselineStrategy::MostFrequent => self.overall,
                BaselineStrategy::HomeField => {
                    if is_home(row) {
                        self.home
                    } else {
                        self.away
                    }
                }
            })
            .collect()
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<i32> {
        match self.strategy {
            BaselineStrategy::MostFrequent => vec![i32::from(self.overall >= 0.5); x.len()],
            BaselineStrategy::HomeField => x.iter().map(|row| i32::from(is_home(row))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Samples {
        // Home rows win 3 of 4, away rows 1 of 4.
        let x = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0]
            .iter()
            .map(|h| vec![*h, 0.0])
            .collect();
        Samples {
            x,
            y: vec![1, 1, 1, 0, 1, 0, 0, 0],
            seasons: vec![2020; 8],
        }
    }

    #[test]
    fn home_field_rule_uses_venue_frequencies() {
        let data = samples();
        let model = BaselineModel::fit(&BaselineParams::default(), &data);
        assert_eq!(model.home, 0.75);
        assert_eq!(model.away, 0.25);
        let probs = model.predict_proba(&[vec![1.0, 0.0], vec![-1.0, 0.0]]);
        assert_eq!(probs, vec![0.75, 0.25]);
        assert_eq!(model.predict(&[vec![1.0, 0.0], vec![-1.0, 0.0]]), vec![1, 0]);
    }

    #[test]
    fn most_frequent_ignores_features() {
        let params = BaselineParams {
            strategy: BaselineStrategy::MostFrequent,
        };
        let model = BaselineModel::fit(&params, &samples());
        assert_eq!(model.predict_proba(&[vec![1.0, 0.0]]), vec![0.5]);
        assert_eq!(model.predict(&[vec![-1.0, 0.0]]), vec![1]);
    }
}
