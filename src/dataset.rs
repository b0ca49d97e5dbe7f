//! Joins the feature columns onto the game table and produces the model-ready rows.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::boxscore::BoxscoreTables;
use crate::features::play_stats::{self, build_play_stat_tables};
use crate::features::pythag::{build_pythag_table, pythag_log5_column};
use crate::features::qb_rating::{build_qb_table, qb_rating_column};
use crate::games::{GameRow, game_points, posteam_defteam_map, reduce_games};

pub const FEATURE_NAMES: [&str; 6] = [
    "obj_team_is_home",
    "rest_net",
    "yards_play_net",
    "points_drive_net",
    "pythag_log5_net",
    "qb_rating_net",
];

/// How missing feature values are handled before training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Starting-QB rating falls back to the mean; rows missing anything else are dropped.
    Mixed,
    Drop,
    /// Every team-level stat falls back to its mean.
    Impute,
}

impl NullPolicy {
    fn imputes_qb(self) -> bool {
        matches!(self, NullPolicy::Mixed | NullPolicy::Impute)
    }

    fn imputes_team_stats(self) -> bool {
        self == NullPolicy::Impute
    }
}

impl FromStr for NullPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mixed" => Ok(NullPolicy::Mixed),
            "drop" => Ok(NullPolicy::Drop),
            "impute" => Ok(NullPolicy::Impute),
            other => bail!("unknown null policy {other:?} (expected mixed, drop or impute)"),
        }
    }
}

impl fmt::Display for NullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NullPolicy::Mixed => "mixed",
            NullPolicy::Drop => "drop",
            NullPolicy::Impute => "impute",
        };
        f.write_str(name)
    }
}

/// One game from one team's perspective with every feature present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
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
}

impl FeatureRow {
    /// Model inputs in `FEATURE_NAMES` order. Identifiers and season are not features.
    pub fn features(&self) -> Vec<f64> {
        vec![
            if self.obj_team_is_home { 1.0 } else { 0.0 },
            self.rest_net,
            self.yards_play_net,
            self.points_drive_net,
            self.pythag_log5_net,
            self.qb_rating_net,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub game_rows: usize,
    pub out_of_range: usize,
    pub dropped_missing: usize,
    pub kept: usize,
}

/// Builds the feature rows for every perspective row in `games`. Rolling stats are
/// computed over the full table before the training range is applied, so early weeks
/// still feed later ones.
pub fn build_features(
    games: &[GameRow],
    tables: &BoxscoreTables,
    min_year: i32,
    policy: NullPolicy,
) -> Result<(Vec<FeatureRow>, BuildSummary)> {
    let map = posteam_defteam_map(games);
    let pythag = build_pythag_table(&game_points(games))?;
    let qb = build_qb_table(&tables.player_offense, &tables.starters, &map)?;
    let plays = build_play_stat_tables(&tables.drives, &map)?;
    info!(
        pythag = pythag.len(),
        qb = qb.len(),
        yards_play = plays.yards_play.len(),
        "built team-week stat tables"
    );

    let impute_team = policy.imputes_team_stats();
    let log5 = pythag_log5_column(games, &pythag, impute_team);
    let qb_net = qb_rating_column(games, &qb, policy.imputes_qb());
    let yards_play = play_stats::net_column(games, &plays.yards_play, impute_team);
    let points_drive = play_stats::net_column(games, &plays.points_drive, impute_team);

    let mut summary = BuildSummary {
        game_rows: games.len(),
        ..BuildSummary::default()
    };
    let in_range = reduce_games(
        games.iter().enumerate().collect(),
        min_year,
        |(_, g): &(usize, &GameRow)| (g.season, g.week),
    );
    summary.out_of_range = games.len() - in_range.len();

    let mut rows = Vec::with_capacity(in_range.len());
    for (idx, g) in in_range {
        let (Some(pythag_log5_net), Some(qb_rating_net), Some(yards_play_net), Some(points_drive_net)) =
            (log5[idx], qb_net[idx], yards_play[idx], points_drive[idx])
        else {
            summary.dropped_missing += 1;
            continue;
        };
        rows.push(FeatureRow {
            game_id: g.game_id.clone(),
            season: g.season,
            week: g.week,
            obj_team: g.obj_team.clone(),
            adv_team: g.adv_team.clone(),
            result: g.result,
            obj_team_is_home: g.obj_team_is_home,
            rest_net: g.rest_net(),
            yards_play_net,
            points_drive_net,
            pythag_log5_net,
            qb_rating_net,
            target: i32::from(g.result > 0),
        });
    }
    sort_rows(&mut rows);
    summary.kept = rows.len();

    if summary.dropped_missing > 0 {
        warn!(
            dropped = summary.dropped_missing,
            policy = %policy,
            "dropped rows with missing features"
        );
    }
    Ok((rows, summary))
}

pub fn sort_rows(rows: &mut [FeatureRow]) {
    rows.sort_by(|a, b| {
        (a.season, a.week, a.game_id.as_str(), a.obj_team_is_home).cmp(&(
            b.season,
            b.week,
            b.game_id.as_str(),
            b.obj_team_is_home,
        ))
    });
}

/// Chronological split: seasons before `holdout_year` train, the rest test.
pub fn split_by_season(
    rows: Vec<FeatureRow>,
    holdout_year: i32,
) -> (Vec<FeatureRow>, Vec<FeatureRow>) {
    rows.into_iter().partition(|r| r.season < holdout_year)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(season: i32, week: u32) -> FeatureRow {
        FeatureRow {
            game_id: format!("{season}_{week:02}_A_B"),
            season,
            week,
            obj_team: "A".to_string(),
            adv_team: "B".to_string(),
            result: 3,
            obj_team_is_home: true,
            rest_net: 0.0,
            yards_play_net: 0.1,
            points_drive_net: 0.2,
            pythag_log5_net: 0.05,
            qb_rating_net: -4.5,
            target: 1,
        }
    }

    #[test]
    fn null_policy_parses_known_names_only() {
        assert_eq!("mixed".parse::<NullPolicy>().unwrap(), NullPolicy::Mixed);
        assert_eq!(" Drop ".parse::<NullPolicy>().unwrap(), NullPolicy::Drop);
        assert_eq!("impute".parse::<NullPolicy>().unwrap(), NullPolicy::Impute);
        assert!("zero".parse::<NullPolicy>().is_err());
        assert_eq!(NullPolicy::Impute.to_string(), "impute");
    }

    #[test]
    fn split_is_chronological_and_disjoint() {
        let rows = (2018..2024).map(|s| row(s, 6)).collect::<Vec<_>>();
        let (train, test) = split_by_season(rows, 2022);
        assert_eq!(train.len(), 4);
        assert_eq!(test.len(), 2);
        let last_train = train.iter().map(|r| r.season).max().unwrap();
        let first_test = test.iter().map(|r| r.season).min().unwrap();
        assert!(last_train < first_test);
    }

    #[test]
    fn features_exclude_identifiers() {
        let r = row(2020, 5);
        let x = r.features();
        assert_eq!(x.len(), FEATURE_NAMES.len());
        assert_eq!(x[0], 1.0);
        assert_eq!(x[5], -4.5);
    }
}
