//! Rolling passer rating of each team's starting quarterback.

use std::collections::HashMap;

use anyhow::Result;

use crate::boxscore::{PlayerOffenseRow, StarterRow};
use crate::games::{GameRow, PosteamMap, fix_pfr_team_name};
use crate::rolling::{StatTable, TeamWeekStat, group_ordered, join_obj_adv, rolling_sums, round1};

/// Appearances kept in a passer's rolling window; spans seasons.
pub const QB_WINDOW: usize = 50;
pub const COMPONENT_MAX: f64 = 2.375;
pub const STARTING_QB_SLOT: &str = "QB_1";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PasserTotals {
    pub completions: f64,
    pub attempts: f64,
    pub yards: f64,
    pub touchdowns: f64,
    pub interceptions: f64,
}

impl PasserTotals {
    fn as_array(self) -> [f64; 5] {
        [
            self.completions,
            self.attempts,
            self.yards,
            self.touchdowns,
            self.interceptions,
        ]
    }

    fn from_array(v: [f64; 5]) -> Self {
        Self {
            completions: v[0],
            attempts: v[1],
            yards: v[2],
            touchdowns: v[3],
            interceptions: v[4],
        }
    }
}

/// The four passer rating terms, each clipped to `[0, COMPONENT_MAX]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingComponents {
    pub completion: f64,
    pub yards: f64,
    pub touchdown: f64,
    pub interception: f64,
}

impl RatingComponents {
    /// `None` for zero attempts.
    pub fn from_totals(t: PasserTotals) -> Option<Self> {
        if t.attempts <= 0.0 {
            return None;
        }
        let clip = |v: f64| v.clamp(0.0, COMPONENT_MAX);
        Some(Self {
            completion: clip((t.completions / t.attempts - 0.3) * 5.0),
            yards: clip((t.yards / t.attempts - 3.0) * 0.25),
            touchdown: clip(t.touchdowns / t.attempts * 20.0),
            interception: clip(COMPONENT_MAX - t.interceptions / t.attempts * 25.0),
        })
    }

    pub fn rating(&self) -> f64 {
        let sum = self.completion + self.yards + self.touchdown + self.interception;
        round1(sum / 6.0 * 100.0)
    }
}

pub fn passer_rating(t: PasserTotals) -> Option<f64> {
    RatingComponents::from_totals(t).map(|c| c.rating())
}

/// A passer's line in one game, placed on the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct PasserGame {
    pub player: String,
    pub pfr: String,
    pub season: i32,
    pub week: u32,
    pub totals: PasserTotals,
}

/// Player rows with at least one attempt whose team can be found on the schedule.
pub fn locate_passer_games(rows: &[PlayerOffenseRow], map: &PosteamMap) -> Vec<PasserGame> {
    rows.iter()
        .filter(|r| r.pass_attempts > 0)
        .filter_map(|r| {
            let team = fix_pfr_team_name(&r.team).to_string();
            let slot = map.get(&(r.pfr.clone(), team))?;
            Some(PasserGame {
                player: r.player.clone(),
                pfr: r.pfr.clone(),
                season: slot.season,
                week: slot.week,
                totals: PasserTotals {
                    completions: r.completions as f64,
                    attempts: r.pass_attempts as f64,
                    yards: r.pass_yards as f64,
                    touchdowns: r.pass_td as f64,
                    interceptions: r.interceptions as f64,
                },
            })
        })
        .collect()
}

/// Per player, the rolling rating after each appearance, in schedule order.
#[derive(Debug, Clone, Default)]
pub struct PasserHistory {
    by_player: HashMap<String, Vec<((i32, u32), Option<f64>)>>,
}

impl PasserHistory {
    pub fn build(games: &[PasserGame], window: usize) -> Self {
        let groups = group_ordered(games.iter(), |g| g.player.clone(), |g| (g.season, g.week));
        let mut by_player = HashMap::with_capacity(groups.len());
        for (player, rows) in groups {
            let values = rows.iter().map(|g| g.totals.as_array()).collect::<Vec<_>>();
            let history = rows
                .iter()
                .zip(rolling_sums(&values, window))
                .map(|(g, sums)| {
                    (
                        (g.season, g.week),
                        passer_rating(PasserTotals::from_array(sums)),
                    )
                })
                .collect::<Vec<_>>();
            by_player.insert(player, history);
        }
        Self { by_player }
    }

    /// The rolling rating through the player's last appearance strictly before the game.
    pub fn rating_before(&self, player: &str, season: i32, week: u32) -> Option<f64> {
        let history = self.by_player.get(player)?;
        let idx = history.partition_point(|(at, _)| *at < (season, week));
        if idx == 0 {
            return None;
        }
        history[idx - 1].1
    }
}

/// Starting-QB rating per (team, season, week). Teams whose starter has no prior
/// history carry no value; imputation is left to the caller.
pub fn build_qb_table(
    player_offense: &[PlayerOffenseRow],
    starters: &[StarterRow],
    map: &PosteamMap,
) -> Result<StatTable> {
    let history = PasserHistory::build(&locate_passer_games(player_offense, map), QB_WINDOW);

    let rows = starters
        .iter()
        .filter(|s| s.slot == STARTING_QB_SLOT)
        .filter_map(|s| {
            let team = fix_pfr_team_name(&s.team).to_string();
            let slot = map.get(&(s.pfr.clone(), team.clone()))?;
            Some(TeamWeekStat {
                value: history.rating_before(&s.player, slot.season, slot.week),
                team,
                season: slot.season,
                week: slot.week,
            })
        })
        .collect::<Vec<_>>();
    StatTable::from_rows("qb_rating", rows)
}

/// `round1(obj - adv)` per game row. With `impute`, a starter without history takes
/// the mean rating.
pub fn qb_rating_column(games: &[GameRow], table: &StatTable, impute: bool) -> Vec<Option<f64>> {
    join_obj_adv(games, table, impute)
        .into_iter()
        .map(|pair| pair.both().map(|(obj, adv)| round1(obj - adv)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(cmp: f64, att: f64, yds: f64, td: f64, int: f64) -> PasserTotals {
        PasserTotals {
            completions: cmp,
            attempts: att,
            yards: yds,
            touchdowns: td,
            interceptions: int,
        }
    }

    fn in_range(c: RatingComponents) -> bool {
        [c.completion, c.yards, c.touchdown, c.interception]
            .iter()
            .all(|v| (0.0..=COMPONENT_MAX).contains(v))
    }

    #[test]
    fn components_are_clipped_for_extreme_lines() {
        let perfect = RatingComponents::from_totals(totals(10.0, 10.0, 400.0, 10.0, 0.0)).unwrap();
        assert!(in_range(perfect));
        assert_eq!(perfect.rating(), 158.3);

        let awful = RatingComponents::from_totals(totals(0.0, 10.0, -20.0, 0.0, 10.0)).unwrap();
        assert!(in_range(awful));
        assert_eq!(awful.rating(), 0.0);

        for att in 1..30 {
            let c = RatingComponents::from_totals(totals(att as f64, att as f64, 5.0, 1.0, 3.0))
                .unwrap();
            assert!(in_range(c));
        }
    }

    #[test]
    fn zero_attempts_has_no_rating() {
        assert_eq!(passer_rating(totals(0.0, 0.0, 0.0, 0.0, 0.0)), None);
    }

    #[test]
    fn typical_line_matches_nfl_formula() {
        // 20/30, 250 yds, 2 TD, 1 INT
        assert_eq!(passer_rating(totals(20.0, 30.0, 250.0, 2.0, 1.0)), Some(100.7));
    }

    #[test]
    fn rating_before_is_strictly_prior() {
        let game = |week: u32, cmp: f64| PasserGame {
            player: "QB".to_string(),
            pfr: format!("g{week}"),
            season: 2020,
            week,
            totals: totals(cmp, 20.0, 200.0, 1.0, 0.0),
        };
        let history = PasserHistory::build(&[game(1, 10.0), game(2, 20.0), game(4, 15.0)], QB_WINDOW);
        assert_eq!(history.rating_before("QB", 2020, 1), None);
        let after_week1 = passer_rating(totals(10.0, 20.0, 200.0, 1.0, 0.0));
        assert_eq!(history.rating_before("QB", 2020, 2), after_week1);
        let after_week2 = passer_rating(totals(30.0, 40.0, 400.0, 2.0, 0.0));
        assert_eq!(history.rating_before("QB", 2020, 3), after_week2);
        assert_eq!(history.rating_before("QB", 2020, 4), after_week2);
        assert_eq!(history.rating_before("nobody", 2020, 4), None);
    }
}
