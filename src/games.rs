//! Schedule cleaning and the per-team perspective rows every feature is keyed on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schedule::RawGame;

/// First season played under the 17-game schedule.
pub const SEVENTEEN_GAME_SEASON: i32 = 2021;
/// Weeks up to and including this one are dropped for lack of rolling history.
pub const MIN_FEATURE_WEEK: u32 = 4;

/// One game seen from one side. `result` is object score minus advantage score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    pub game_id: String,
    pub pfr: Option<String>,
    pub season: i32,
    pub week: u32,
    pub obj_team: String,
    pub adv_team: String,
    pub obj_score: i32,
    pub adv_score: i32,
    pub result: i32,
    pub obj_team_is_home: bool,
    pub obj_rest: Option<i32>,
    pub adv_rest: Option<i32>,
}

impl GameRow {
    pub fn rest_net(&self) -> f64 {
        let obj = self.obj_rest.unwrap_or(0) as f64;
        let adv = self.adv_rest.unwrap_or(0) as f64;
        obj - adv
    }
}

/// Scores a team put up in one game, from the game table.
#[derive(Debug, Clone, PartialEq)]
pub struct GamePoints {
    pub posteam: String,
    pub defteam: String,
    pub season: i32,
    pub week: u32,
    pub points_game: i32,
}

/// Where a box-score team row sits on the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameSlot {
    pub season: i32,
    pub week: u32,
    pub defteam: String,
}

/// Box-score team codes keyed by pfr id and team.
pub type PosteamMap = HashMap<(String, String), TeamGameSlot>;

/// Regular-season games with a recorded result and both scores.
pub fn clean_raw_games(raw: &[RawGame]) -> Vec<RawGame> {
    raw.iter()
        .filter(|g| g.game_type == "REG")
        .filter(|g| g.result.is_some() && g.home_score.is_some() && g.away_score.is_some())
        .cloned()
        .collect()
}

/// Pivots each game into an away-perspective row followed by a home-perspective row.
pub fn transform_home_away(games: &[RawGame]) -> Vec<GameRow> {
    let mut sorted = games.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.game_id.cmp(&b.game_id));

    let mut out = Vec::with_capacity(sorted.len() * 2);
    for g in sorted {
        let (Some(home_score), Some(away_score)) = (g.home_score, g.away_score) else {
            continue;
        };
        let result = g.result.unwrap_or(home_score - away_score);
        out.push(GameRow {
            game_id: g.game_id.clone(),
            pfr: g.pfr.clone(),
            season: g.season,
            week: g.week,
            obj_team: g.away_team.clone(),
            adv_team: g.home_team.clone(),
            obj_score: away_score,
            adv_score: home_score,
            result: -result,
            obj_team_is_home: false,
            obj_rest: g.away_rest,
            adv_rest: g.home_rest,
        });
        out.push(GameRow {
            game_id: g.game_id.clone(),
            pfr: g.pfr.clone(),
            season: g.season,
            week: g.week,
            obj_team: g.home_team.clone(),
            adv_team: g.away_team.clone(),
            obj_score: home_score,
            adv_score: away_score,
            result,
            obj_team_is_home: true,
            obj_rest: g.home_rest,
            adv_rest: g.away_rest,
        });
    }
    out
}

/// Maps (pfr id, team) to the team's season, week and opponent, in both directions.
pub fn posteam_defteam_map(games: &[GameRow]) -> PosteamMap {
    let mut map = HashMap::with_capacity(games.len());
    for g in games {
        let Some(pfr) = g.pfr.as_ref() else {
            continue;
        };
        map.insert(
            (pfr.clone(), g.obj_team.clone()),
            TeamGameSlot {
                season: g.season,
                week: g.week,
                defteam: g.adv_team.clone(),
            },
        );
        map.insert(
            (pfr.clone(), g.adv_team.clone()),
            TeamGameSlot {
                season: g.season,
                week: g.week,
                defteam: g.obj_team.clone(),
            },
        );
    }
    map
}

/// Points scored by the object team in each perspective row.
pub fn game_points(games: &[GameRow]) -> Vec<GamePoints> {
    games
        .iter()
        .map(|g| GamePoints {
            posteam: g.obj_team.clone(),
            defteam: g.adv_team.clone(),
            season: g.season,
            week: g.week,
            points_game: g.obj_score,
        })
        .collect()
}

/// Rewrites legacy box-score team codes to the schedule's codes.
pub fn fix_pfr_team_name(team: &str) -> &str {
    match team {
        "GNB" => "GB",
        "KAN" => "KC",
        "LAR" => "LA",
        "LVR" => "LV",
        "NOR" => "NO",
        "NWE" => "NE",
        "SDG" => "SD",
        "SFO" => "SF",
        "TAM" => "TB",
        other => other,
    }
}

/// Whether a game falls in the trainable range: past the early weeks, on or after
/// `min_year`, and inside the regular-season week cap for its schedule era.
pub fn in_training_range(season: i32, week: u32, min_year: i32) -> bool {
    let max_week = if season < SEVENTEEN_GAME_SEASON { 16 } else { 17 };
    week > MIN_FEATURE_WEEK && season >= min_year && week <= max_week
}

pub fn reduce_games<T>(rows: Vec<T>, min_year: i32, key: impl Fn(&T) -> (i32, u32)) -> Vec<T> {
    rows.into_iter()
        .filter(|r| {
            let (season, week) = key(r);
            in_training_range(season, week, min_year)
        })
        .collect()
}
