//! Rolling-window, shift and object/advantage join primitives shared by the feature builders.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use anyhow::{Result, anyhow};

use crate::games::GameRow;

/// Longer than any season, so a window this size covers the whole season so far.
pub const SEASON_WINDOW: usize = 99;

/// A single aggregated value for a team in a given week.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamWeekStat {
    pub team: String,
    pub season: i32,
    pub week: u32,
    pub value: Option<f64>,
}

/// Sums of each of the `N` columns over the last `window` entries, current entry included.
/// `values` must already be in group order.
pub fn rolling_sums<const N: usize>(values: &[[f64; N]], window: usize) -> Vec<[f64; N]> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut acc = [0.0_f64; N];
    for (idx, v) in values.iter().enumerate() {
        for c in 0..N {
            acc[c] += v[c];
        }
        if idx >= window {
            let old = &values[idx - window];
            for c in 0..N {
                acc[c] -= old[c];
            }
        }
        out.push(acc);
    }
    out
}

/// Groups rows by `key`, then orders each group by `order`.
pub fn group_ordered<T, K, O>(
    rows: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
    order: impl Fn(&T) -> O,
) -> Vec<(K, Vec<T>)>
where
    K: Ord + Clone + std::hash::Hash,
    O: Ord,
{
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for row in rows {
        groups.entry(key(&row)).or_default().push(row);
    }
    let mut out = groups.into_iter().collect::<Vec<_>>();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, rows) in out.iter_mut() {
        rows.sort_by_key(|r| order(r));
    }
    out
}

/// Moves every value forward one entry within its (team, season) group, so the value
/// stored at a week is the aggregate through the team's previous game. The first game
/// of each group gets no value.
pub fn shift_within_season(stats: Vec<TeamWeekStat>) -> Vec<TeamWeekStat> {
    let groups = group_ordered(stats, |s| (s.team.clone(), s.season), |s| s.week);
    let mut out = Vec::new();
    for (_, rows) in groups {
        let mut prev: Option<f64> = None;
        for mut row in rows {
            let current = row.value;
            row.value = prev;
            prev = current;
            out.push(row);
        }
    }
    out
}

/// Lookup of team-week stats with at most one value per (team, season, week).
#[derive(Debug, Clone, Default)]
pub struct StatTable {
    values: HashMap<(String, i32, u32), Option<f64>>,
}

impl StatTable {
    pub fn from_rows(name: &str, rows: Vec<TeamWeekStat>) -> Result<Self> {
        let mut values = HashMap::with_capacity(rows.len());
        for row in rows {
            match values.entry((row.team, row.season, row.week)) {
                Entry::Occupied(e) => {
                    let (team, season, week) = e.key();
                    return Err(anyhow!(
                        "{name}: duplicate value for {team} season {season} week {week}"
                    ));
                }
                Entry::Vacant(e) => {
                    e.insert(row.value);
                }
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, team: &str, season: i32, week: u32) -> Option<f64> {
        self.values
            .get(&(team.to_string(), season, week))
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the present values, if any.
    pub fn mean(&self) -> Option<f64> {
        let present = self.values.values().filter_map(|v| *v).collect::<Vec<_>>();
        if present.is_empty() {
            return None;
        }
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Object- and advantage-side values of a stat for one game row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidePair {
    pub obj: Option<f64>,
    pub adv: Option<f64>,
}

impl SidePair {
    pub fn both(self) -> Option<(f64, f64)> {
        Some((self.obj?, self.adv?))
    }

    /// Replaces missing sides with `fill`.
    pub fn filled(self, fill: Option<f64>) -> Self {
        Self {
            obj: self.obj.or(fill),
            adv: self.adv.or(fill),
        }
    }
}

/// Looks the stat up once for the object team and once for the advantage team.
/// With `impute`, a missing side takes the table mean.
pub fn join_obj_adv(games: &[GameRow], table: &StatTable, impute: bool) -> Vec<SidePair> {
    let fill = if impute { table.mean() } else { None };
    games
        .iter()
        .map(|g| {
            SidePair {
                obj: table.get(&g.obj_team, g.season, g.week),
                adv: table.get(&g.adv_team, g.season, g.week),
            }
            .filled(fill)
        })
        .collect()
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(team: &str, season: i32, week: u32, value: f64) -> TeamWeekStat {
        TeamWeekStat {
            team: team.to_string(),
            season,
            week,
            value: Some(value),
        }
    }

    #[test]
    fn rolling_sums_match_brute_force() {
        let values = (0..40)
            .map(|i| [((i * 7) % 11) as f64, ((i * 3) % 5) as f64])
            .collect::<Vec<_>>();
        for window in [1usize, 3, 5, 17, 99] {
            let rolled = rolling_sums(&values, window);
            for (idx, got) in rolled.iter().enumerate() {
                let start = (idx + 1).saturating_sub(window);
                for c in 0..2 {
                    let expected: f64 = values[start..=idx].iter().map(|v| v[c]).sum();
                    assert!((got[c] - expected).abs() < 1e-9, "window {window} idx {idx}");
                }
            }
        }
    }

    #[test]
    fn shift_uses_previous_entry_only() {
        let shifted = shift_within_season(vec![
            stat("KC", 2020, 3, 30.0),
            stat("KC", 2020, 1, 10.0),
            stat("KC", 2020, 2, 20.0),
            stat("KC", 2021, 1, 99.0),
        ]);
        let table = StatTable::from_rows("t", shifted).unwrap();
        assert_eq!(table.get("KC", 2020, 1), None);
        assert_eq!(table.get("KC", 2020, 2), Some(10.0));
        assert_eq!(table.get("KC", 2020, 3), Some(20.0));
        assert_eq!(table.get("KC", 2021, 1), None);
    }

    #[test]
    fn shift_skips_over_bye_weeks() {
        let shifted = shift_within_season(vec![stat("NE", 2020, 5, 1.0), stat("NE", 2020, 7, 2.0)]);
        let table = StatTable::from_rows("t", shifted).unwrap();
        assert_eq!(table.get("NE", 2020, 7), Some(1.0));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = StatTable::from_rows("dup", vec![stat("KC", 2020, 1, 1.0), stat("KC", 2020, 1, 2.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn mean_ignores_missing_values() {
        let mut rows = vec![stat("A", 2020, 1, 2.0), stat("B", 2020, 1, 4.0)];
        rows.push(TeamWeekStat {
            team: "C".to_string(),
            season: 2020,
            week: 1,
            value: None,
        });
        let table = StatTable::from_rows("t", rows).unwrap();
        assert_eq!(table.mean(), Some(3.0));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn filled_only_touches_missing_sides() {
        let pair = SidePair {
            obj: Some(1.0),
            adv: None,
        };
        assert_eq!(pair.filled(Some(5.0)).both(), Some((1.0, 5.0)));
        assert_eq!(pair.filled(None).both(), None);
    }
}
