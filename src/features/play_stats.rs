//! Per-possession efficiency from drive summaries: yards per play and points per drive,
//! offense minus defense allowed.

use std::collections::HashMap;

use anyhow::Result;

use crate::boxscore::DriveRow;
use crate::games::{GameRow, PosteamMap, fix_pfr_team_name};
use crate::rolling::{
    SEASON_WINDOW, StatTable, TeamWeekStat, group_ordered, join_obj_adv, rolling_sums,
    shift_within_season,
};

/// Drive totals for one offense in one game.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveTotals {
    pub posteam: String,
    pub defteam: String,
    pub season: i32,
    pub week: u32,
    pub net_yards: f64,
    pub plays: f64,
    pub points: f64,
    pub drives: f64,
}

impl DriveTotals {
    fn as_array(&self) -> [f64; 4] {
        [self.net_yards, self.plays, self.points, self.drives]
    }
}

pub fn aggregate_drives(drives: &[DriveRow], map: &PosteamMap) -> Vec<DriveTotals> {
    let mut acc: HashMap<(String, String), DriveTotals> = HashMap::new();
    for d in drives {
        let team = fix_pfr_team_name(&d.team).to_string();
        let Some(slot) = map.get(&(d.pfr.clone(), team.clone())) else {
            continue;
        };
        let entry = acc
            .entry((d.pfr.clone(), team.clone()))
            .or_insert_with(|| DriveTotals {
                posteam: team,
                defteam: slot.defteam.clone(),
                season: slot.season,
                week: slot.week,
                net_yards: 0.0,
                plays: 0.0,
                points: 0.0,
                drives: 0.0,
            });
        entry.net_yards += d.net_yards.unwrap_or(0) as f64;
        entry.plays += d.plays.unwrap_or(0) as f64;
        entry.points += d.outcome().points() as f64;
        entry.drives += 1.0;
    }
    let mut out = acc.into_values().collect::<Vec<_>>();
    out.sort_by(|a, b| {
        (a.posteam.as_str(), a.season, a.week).cmp(&(b.posteam.as_str(), b.season, b.week))
    });
    out
}

/// Rolling efficiency for one side of the ball. `defense` switches the grouping team
/// from the offense to the defense facing it.
fn rolling_efficiency(
    totals: &[DriveTotals],
    defense: bool,
    window: usize,
) -> HashMap<(String, i32, u32), [Option<f64>; 2]> {
    let groups = group_ordered(
        totals.iter(),
        |t| {
            let team = if defense { &t.defteam } else { &t.posteam };
            (team.clone(), t.season)
        },
        |t| t.week,
    );
    let mut out = HashMap::new();
    for ((team, season), rows) in groups {
        let values = rows.iter().map(|t| t.as_array()).collect::<Vec<_>>();
        for (t, sums) in rows.iter().zip(rolling_sums(&values, window)) {
            let [yards, plays, points, drives] = sums;
            out.insert(
                (team.clone(), season, t.week),
                [ratio(yards, plays), ratio(points, drives)],
            );
        }
    }
    out
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 { Some(num / den) } else { None }
}

/// Shifted per-team net efficiencies: (yards per play, points per drive).
pub struct PlayStatTables {
    pub yards_play: StatTable,
    pub points_drive: StatTable,
}

pub fn build_play_stat_tables(drives: &[DriveRow], map: &PosteamMap) -> Result<PlayStatTables> {
    let totals = aggregate_drives(drives, map);
    let offense = rolling_efficiency(&totals, false, SEASON_WINDOW);
    let defense = rolling_efficiency(&totals, true, SEASON_WINDOW);

    let mut yards_play = Vec::with_capacity(offense.len());
    let mut points_drive = Vec::with_capacity(offense.len());
    for ((team, season, week), off) in offense {
        let Some(def) = defense.get(&(team.clone(), season, week)) else {
            continue;
        };
        let net = |i: usize| Some(off[i]? - def[i]?);
        yards_play.push(TeamWeekStat {
            team: team.clone(),
            season,
            week,
            value: net(0),
        });
        points_drive.push(TeamWeekStat {
            team,
            season,
            week,
            value: net(1),
        });
    }

    Ok(PlayStatTables {
        yards_play: StatTable::from_rows("yards_play", shift_within_season(yards_play))?,
        points_drive: StatTable::from_rows("points_drive", shift_within_season(points_drive))?,
    })
}

/// Object team's net efficiency minus the advantage team's.
pub fn net_column(games: &[GameRow], table: &StatTable, impute: bool) -> Vec<Option<f64>> {
    join_obj_adv(games, table, impute)
        .into_iter()
        .map(|pair| pair.both().map(|(obj, adv)| obj - adv))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::TeamGameSlot;

    fn drive(pfr: &str, team: &str, plays: i32, yards: i32, result: &str) -> DriveRow {
        DriveRow {
            pfr: pfr.to_string(),
            team: team.to_string(),
            num: None,
            quarter: Some(1),
            time: String::new(),
            los: String::new(),
            plays: Some(plays),
            length: String::new(),
            net_yards: Some(yards),
            result: result.to_string(),
        }
    }

    fn map() -> PosteamMap {
        let mut map = PosteamMap::new();
        for (pfr, week) in [("g1", 1u32), ("g2", 2)] {
            map.insert(
                (pfr.to_string(), "KC".to_string()),
                TeamGameSlot {
                    season: 2020,
                    week,
                    defteam: "LV".to_string(),
                },
            );
            map.insert(
                (pfr.to_string(), "LV".to_string()),
                TeamGameSlot {
                    season: 2020,
                    week,
                    defteam: "KC".to_string(),
                },
            );
        }
        map
    }

    #[test]
    fn aggregates_with_normalized_team_codes() {
        let drives = vec![
            drive("g1", "KAN", 10, 75, "Touchdown"),
            drive("g1", "KAN", 5, 30, "Field goal"),
            drive("g1", "LVR", 3, 2, "Punt"),
            drive("g9", "KAN", 3, 2, "Punt"),
        ];
        let totals = aggregate_drives(&drives, &map());
        assert_eq!(totals.len(), 2);
        let kc = totals.iter().find(|t| t.posteam == "KC").unwrap();
        assert_eq!(kc.net_yards, 105.0);
        assert_eq!(kc.plays, 15.0);
        assert_eq!(kc.points, 10.0);
        assert_eq!(kc.drives, 2.0);
        assert_eq!(kc.defteam, "LV");
    }

    #[test]
    fn tables_are_shifted_one_game() {
        let drives = vec![
            drive("g1", "KAN", 10, 50, "Touchdown"),
            drive("g1", "LVR", 10, 30, "Punt"),
            drive("g2", "KAN", 10, 10, "Punt"),
            drive("g2", "LVR", 10, 70, "Touchdown"),
        ];
        let tables = build_play_stat_tables(&drives, &map()).unwrap();
        assert_eq!(tables.yards_play.get("KC", 2020, 1), None);
        // Through week 1: KC 5.0 ypp on offense, 3.0 allowed.
        let kc = tables.yards_play.get("KC", 2020, 2).unwrap();
        assert!((kc - 2.0).abs() < 1e-12);
        let lv = tables.points_drive.get("LV", 2020, 2).unwrap();
        assert!((lv + 7.0).abs() < 1e-12);
    }
}
