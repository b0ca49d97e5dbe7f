//! Pythagorean expectation over rolling points for/against, compared through log5.

use std::collections::HashMap;

use anyhow::Result;

use crate::games::{GamePoints, GameRow};
use crate::rolling::{
    SEASON_WINDOW, StatTable, TeamWeekStat, group_ordered, join_obj_adv, rolling_sums,
    shift_within_season,
};

pub const PYTHAG_EXPONENT: f64 = 2.77;

/// Expected win rate from points scored and allowed. `None` when both are zero.
pub fn pythag_expectation(points_for: f64, points_against: f64) -> Option<f64> {
    if points_for <= 0.0 {
        return if points_against <= 0.0 { None } else { Some(0.0) };
    }
    Some(1.0 / (1.0 + (points_against / points_for).powf(PYTHAG_EXPONENT)))
}

/// Probability that a team with win rate `pa` beats one with win rate `pb`.
pub fn log5(pa: f64, pb: f64) -> f64 {
    let den = pa + pb - 2.0 * pa * pb;
    if den.abs() < 1e-12 {
        return 0.5;
    }
    (pa - pa * pb) / den
}

/// `log5` centered on zero, so swapping the teams flips the sign.
pub fn log5_net(pa: f64, pb: f64) -> f64 {
    log5(pa, pb) - 0.5
}

#[derive(Debug, Clone, Copy)]
enum Side {
    For,
    Against,
}

fn rolling_points(
    points: &[GamePoints],
    side: Side,
    window: usize,
) -> HashMap<(String, i32, u32), f64> {
    let groups = group_ordered(
        points.iter(),
        |p| {
            let team = match side {
                Side::For => &p.posteam,
                Side::Against => &p.defteam,
            };
            (team.clone(), p.season)
        },
        |p| p.week,
    );

    let mut out = HashMap::new();
    for ((team, season), rows) in groups {
        let values = rows.iter().map(|p| [p.points_game as f64]).collect::<Vec<_>>();
        for (p, sum) in rows.iter().zip(rolling_sums(&values, window)) {
            out.insert((team.clone(), season, p.week), sum[0]);
        }
    }
    out
}

/// Unshifted rolling Pythagorean expectation for every team game. Rows are the inner
/// join of the points-for and points-against windows.
pub fn pythag_by_team_week(points: &[GamePoints], window: usize) -> Vec<TeamWeekStat> {
    let points_for = rolling_points(points, Side::For, window);
    let points_against = rolling_points(points, Side::Against, window);

    let mut out = points_for
        .into_iter()
        .filter_map(|((team, season, week), pf)| {
            let pa = points_against.get(&(team.clone(), season, week))?;
            Some(TeamWeekStat {
                team,
                season,
                week,
                value: pythag_expectation(pf, *pa),
            })
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| {
        (a.team.as_str(), a.season, a.week).cmp(&(b.team.as_str(), b.season, b.week))
    });
    out
}

/// Shifted Pythagorean expectation keyed by (team, season, week).
pub fn build_pythag_table(points: &[GamePoints]) -> Result<StatTable> {
    let stats = pythag_by_team_week(points, SEASON_WINDOW);
    StatTable::from_rows("pyexp", shift_within_season(stats))
}

/// `log5_net(obj, adv)` per game row; missing when either side has no history.
pub fn pythag_log5_column(games: &[GameRow], table: &StatTable, impute: bool) -> Vec<Option<f64>> {
    join_obj_adv(games, table, impute)
        .into_iter()
        .map(|pair| pair.both().map(|(obj, adv)| log5_net(obj, adv)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(posteam: &str, defteam: &str, season: i32, week: u32, points_game: i32) -> GamePoints {
        GamePoints {
            posteam: posteam.to_string(),
            defteam: defteam.to_string(),
            season,
            week,
            points_game,
        }
    }

    #[test]
    fn log5_is_antisymmetric_when_centered() {
        for (pa, pb) in [(0.7, 0.4), (0.1, 0.95), (0.5, 0.5), (0.33, 0.61)] {
            assert!((log5_net(pa, pb) + log5_net(pb, pa)).abs() < 1e-12);
        }
        assert!((log5(0.5, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(log5_net(1.0, 1.0), 0.0);
        assert_eq!(log5_net(0.0, 0.0), 0.0);
    }

    #[test]
    fn pythag_edge_cases() {
        assert_eq!(pythag_expectation(0.0, 0.0), None);
        assert_eq!(pythag_expectation(0.0, 14.0), Some(0.0));
        assert_eq!(pythag_expectation(14.0, 0.0), Some(1.0));
        let even = pythag_expectation(20.0, 20.0).unwrap();
        assert!((even - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rolling_points_for_and_against_use_window() {
        let points = vec![
            pts("A", "B", 2020, 1, 10),
            pts("B", "A", 2020, 1, 7),
            pts("A", "C", 2020, 2, 20),
            pts("C", "A", 2020, 2, 3),
            pts("A", "B", 2020, 3, 30),
            pts("B", "A", 2020, 3, 0),
        ];
        let pf = rolling_points(&points, Side::For, 2);
        let pa = rolling_points(&points, Side::Against, 2);
        assert_eq!(pf[&("A".to_string(), 2020, 3)], 50.0);
        assert_eq!(pa[&("A".to_string(), 2020, 3)], 3.0);
        assert_eq!(pf[&("A".to_string(), 2020, 2)], 30.0);
    }

    #[test]
    fn windows_reset_each_season() {
        let points = vec![
            pts("A", "B", 2020, 17, 40),
            pts("B", "A", 2020, 17, 10),
            pts("A", "B", 2021, 1, 10),
            pts("B", "A", 2021, 1, 20),
        ];
        let stats = pythag_by_team_week(&points, SEASON_WINDOW);
        let a_2021 = stats
            .iter()
            .find(|s| s.team == "A" && s.season == 2021)
            .unwrap();
        assert_eq!(a_2021.value, pythag_expectation(10.0, 20.0));
    }
}
