//! Combines the saved models into one prediction per row.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::Serialize;

use super::artifacts::load_or_train;
use super::baseline::BaselineParams;
use super::gbt::GbtParams;
use super::pipeline::{ModelSpec, Pipeline};
use super::svm::SvmParams;
use super::{Classifier, Samples};
use crate::dataset::FeatureRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteMode {
    /// Mean of the member probabilities.
    Soft,
    /// Majority of the member labels.
    Hard,
}

impl FromStr for VoteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(VoteMode::Soft),
            "hard" => Ok(VoteMode::Hard),
            other => bail!("unknown vote mode {other:?} (expected soft or hard)"),
        }
    }
}

impl fmt::Display for VoteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoteMode::Soft => "soft",
            VoteMode::Hard => "hard",
        })
    }
}

/// Ensemble members with their default hyperparameters.
pub fn member_specs(seed: u64) -> Vec<ModelSpec> {
    vec![
        ModelSpec::Baseline(BaselineParams::default()),
        ModelSpec::Svc(SvmParams {
            seed,
            ..SvmParams::default()
        }),
        ModelSpec::Gbt(GbtParams {
            seed,
            ..GbtParams::default()
        }),
    ]
}

pub fn load_or_train_members(models_dir: &Path, seed: u64, train: &Samples) -> Result<Vec<Pipeline>> {
    member_specs(seed)
        .iter()
        .map(|spec| load_or_train(models_dir, spec, train))
        .collect()
}

/// One member's scores over the prediction rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberOutput {
    pub probs: Vec<f64>,
    pub labels: Vec<i32>,
}

impl MemberOutput {
    pub fn from_model(model: &Pipeline, x: &[Vec<f64>]) -> Self {
        Self {
            probs: model.predict_proba(x),
            labels: model.predict(x),
        }
    }
}

/// Per-row (probability, label). Soft voting thresholds the mean probability at 0.5.
/// Hard voting counts each member's own label, reports the share of positive votes
/// and labels 1 only on a strict majority, so ties go to 0.
pub fn vote(mode: VoteMode, members: &[MemberOutput]) -> Vec<(f64, i32)> {
    let Some(rows) = members.first().map(|m| m.probs.len()) else {
        return Vec::new();
    };
    let n = members.len() as f64;
    (0..rows)
        .map(|i| match mode {
            VoteMode::Soft => {
                let p = members.iter().map(|m| m.probs[i]).sum::<f64>() / n;
                (p, i32::from(p >= 0.5))
            }
            VoteMode::Hard => {
                let yes = members.iter().filter(|m| m.labels[i] == 1).count() as f64;
                (yes / n, i32::from(yes * 2.0 > n))
            }
        })
        .collect()
}

/// A test row with the ensemble's prediction attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub game_id: String,
    pub season: i32,
    pub week: u32,
    pub obj_team: String,
    pub adv_team: String,
    pub result: i32,
    pub obj_team_is_home: bool,
    pub rest_net: f64,
    pub yards_play_net: f64,
    pub points_drive_net: f64,
    pub pythag_log5_net: f64,
    pub qb_rating_net: f64,
    pub target: i32,
    pub pred_prob: f64,
    pub pred_label: i32,
}

pub fn predict_rows(models: &[Pipeline], rows: &[FeatureRow], mode: VoteMode) -> Vec<PredictionRow> {
    let x = rows.iter().map(FeatureRow::features).collect::<Vec<_>>();
    let members = models
        .iter()
        .map(|m| MemberOutput::from_model(m, &x))
        .collect::<Vec<_>>();
    rows.iter()
        .zip(vote(mode, &members))
        .map(|(r, (pred_prob, pred_label))| PredictionRow {
            game_id: r.game_id.clone(),
            season: r.season,
            week: r.week,
            obj_team: r.obj_team.clone(),
            adv_team: r.adv_team.clone(),
            result: r.result,
            obj_team_is_home: r.obj_team_is_home,
            rest_net: r.rest_net,
            yards_play_net: r.yards_play_net,
            points_drive_net: r.points_drive_net,
            pythag_log5_net: r.pythag_log5_net,
            qb_rating_net: r.qb_rating_net,
            target: r.target,
            pred_prob,
            pred_label,
        })
        .collect()
}
