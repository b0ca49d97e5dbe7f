//! Walk-forward cross-validation over whole seasons.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;

use super::evaluate::{Metrics, evaluate_probs};
use super::pipeline::{ModelSpec, Pipeline};
use super::{Classifier, Samples};

#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train_seasons: Vec<i32>,
    pub test_seasons: Vec<i32>,
    pub train_idx: Vec<usize>,
    pub test_idx: Vec<usize>,
}

/// Held-out metrics for one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldScore {
    pub fold: usize,
    pub train_start: i32,
    pub train_end: i32,
    pub test_start: i32,
    pub test_end: i32,
    pub metrics: Metrics,
}

/// Fits `spec` on each fold's training seasons and scores its test seasons. Folds run
/// in parallel; output keeps fold order.
pub fn cross_validate(spec: &ModelSpec, data: &Samples, folds: &[Fold]) -> Result<Vec<FoldScore>> {
    folds
        .par_iter()
        .enumerate()
        .map(|(fold_idx, fold)| {
            let train = data.subset(&fold.train_idx);
            let test = data.subset(&fold.test_idx);
            let model = Pipeline::fit(spec, &train).with_context(|| {
                format!("fitting {} on fold {fold_idx}", spec.name())
            })?;
            let probs = model.predict_proba(&test.x);
            Ok(FoldScore {
                fold: fold_idx,
                train_start: fold.train_seasons.first().copied().unwrap_or_default(),
                train_end: fold.train_seasons.last().copied().unwrap_or_default(),
                test_start: fold.test_seasons.first().copied().unwrap_or_default(),
                test_end: fold.test_seasons.last().copied().unwrap_or_default(),
                metrics: evaluate_probs(&probs, &test.y),
            })
        })
        .collect()
}

/// Trains on `train_size` consecutive seasons, tests on the next `test_size`, then
/// advances the window by `shift_size` seasons. `seasons` holds the season of each row.
pub fn walk_forward_folds(
    seasons: &[i32],
    train_size: usize,
    test_size: usize,
    shift_size: usize,
) -> Result<Vec<Fold>> {
    if train_size == 0 || test_size == 0 || shift_size == 0 {
        bail!(
            "cv sizes must be positive (train {train_size}, test {test_size}, shift {shift_size})"
        );
    }
    let distinct = seasons.iter().copied().collect::<BTreeSet<_>>();
    let distinct = distinct.into_iter().collect::<Vec<_>>();
    if distinct.len() < train_size + test_size {
        bail!(
            "{} seasons cannot fill a {train_size}+{test_size} season fold",
            distinct.len()
        );
    }

    let rows_in = |window: &[i32]| {
        seasons
            .iter()
            .enumerate()
            .filter(|(_, s)| window.contains(s))
            .map(|(i, _)| i)
            .collect::<Vec<_>>()
    };

    let mut folds = Vec::new();
    let mut start = 0;
    while start + train_size + test_size <= distinct.len() {
        let train_seasons = distinct[start..start + train_size].to_vec();
        let test_seasons = distinct[start + train_size..start + train_size + test_size].to_vec();
        folds.push(Fold {
            train_idx: rows_in(&train_seasons),
            test_idx: rows_in(&test_seasons),
            train_seasons,
            test_seasons,
        });
        start += shift_size;
    }
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasons() -> Vec<i32> {
        (2010..2018).flat_map(|s| [s, s, s]).collect()
    }

    #[test]
    fn folds_walk_forward_without_overlap() {
        let folds = walk_forward_folds(&seasons(), 5, 1, 1).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].train_seasons, vec![2010, 2011, 2012, 2013, 2014]);
        assert_eq!(folds[0].test_seasons, vec![2015]);
        assert_eq!(folds[2].test_seasons, vec![2017]);
        for fold in &folds {
            let last_train = fold.train_seasons.iter().max().unwrap();
            assert!(fold.test_seasons.iter().all(|s| s > last_train));
            assert_eq!(fold.train_idx.len(), 15);
            assert_eq!(fold.test_idx.len(), 3);
        }
    }

    #[test]
    fn shift_skips_seasons() {
        let folds = walk_forward_folds(&seasons(), 2, 2, 3).unwrap();
        let tests = folds.iter().map(|f| f.test_seasons.clone()).collect::<Vec<_>>();
        assert_eq!(tests, vec![vec![2012, 2013], vec![2015, 2016]]);
    }

    #[test]
    fn cross_validate_scores_every_fold_in_order() {
        use crate::model::baseline::BaselineParams;

        let seasons = seasons();
        let data = Samples {
            x: seasons
                .iter()
                .enumerate()
                .map(|(i, _)| vec![(i % 2) as f64])
                .collect(),
            y: (0..seasons.len()).map(|i| i32::from(i % 2 == 1)).collect(),
            seasons,
        };
        let folds = walk_forward_folds(&data.seasons, 3, 1, 2).unwrap();
        let spec = ModelSpec::Baseline(BaselineParams::default());
        let scores = cross_validate(&spec, &data, &folds).unwrap();
        assert_eq!(scores.len(), folds.len());
        for (i, s) in scores.iter().enumerate() {
            assert_eq!(s.fold, i);
            assert_eq!(s.metrics.samples, 3);
            assert_eq!(s.metrics.accuracy, 1.0);
        }
    }

    #[test]
    fn too_few_seasons_is_an_error() {
        assert!(walk_forward_folds(&[2020, 2021], 5, 1, 1).is_err());
        assert!(walk_forward_folds(&seasons(), 0, 1, 1).is_err());
    }
}
