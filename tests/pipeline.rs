use std::collections::HashMap;

use nfl_forecast::boxscore::{BoxscoreTables, DriveRow, PlayerOffenseRow, StarterRow};
use nfl_forecast::dataset::{FeatureRow, NullPolicy, build_features, split_by_season};
use nfl_forecast::features::pythag::{
    build_pythag_table, pythag_by_team_week, pythag_log5_column,
};
use nfl_forecast::features::qb_rating::build_qb_table;
use nfl_forecast::games::{clean_raw_games, game_points, posteam_defteam_map, transform_home_away};
use nfl_forecast::rolling::{SEASON_WINDOW, StatTable, round1};
use nfl_forecast::schedule::RawGame;
use nfl_forecast::store::{self, FeatureTable};

fn game(season: i32, week: u32, away: &str, away_score: i32, home: &str, home_score: i32) -> RawGame {
    RawGame {
        game_id: format!("{season}_{week:02}_{away}_{home}"),
        season,
        game_type: "REG".to_string(),
        week,
        away_team: away.to_string(),
        away_score: Some(away_score),
        home_team: home.to_string(),
        home_score: Some(home_score),
        result: Some(home_score - away_score),
        away_rest: Some(7),
        home_rest: Some(7),
        pfr: Some(format!("{season}{week:02}0{}", home.to_lowercase())),
    }
}

#[test]
fn three_team_log5_matches_hand_computation() {
    let raw = vec![
        game(2020, 1, "A", 21, "B", 14),
        game(2020, 2, "C", 10, "A", 24),
        game(2020, 3, "B", 17, "C", 20),
    ];
    let games = transform_home_away(&clean_raw_games(&raw));
    let table = build_pythag_table(&game_points(&games)).unwrap();
    let column = pythag_log5_column(&games, &table, false);

    let week3 = games
        .iter()
        .zip(&column)
        .filter(|(g, _)| g.week == 3)
        .collect::<Vec<_>>();
    assert_eq!(week3.len(), 2);
    for (g, value) in week3 {
        let value = value.expect("both teams have a prior game");
        let expected = if g.obj_team == "B" { 0.2862 } else { -0.2862 };
        assert!(
            (value - expected).abs() < 5e-5,
            "{} got {value}",
            g.obj_team
        );
    }

    // Week 1 has no history for anyone.
    assert!(
        games
            .iter()
            .zip(&column)
            .filter(|(g, _)| g.week == 1)
            .all(|(_, v)| v.is_none())
    );
}

#[test]
fn shifted_stat_equals_previous_unshifted_value() {
    let raw = vec![
        game(2020, 1, "A", 21, "B", 14),
        game(2020, 2, "C", 10, "A", 24),
        game(2020, 3, "B", 17, "C", 20),
        game(2020, 5, "A", 3, "C", 30),
    ];
    let games = transform_home_away(&raw);
    let points = game_points(&games);
    let unshifted = pythag_by_team_week(&points, SEASON_WINDOW);
    let shifted = build_pythag_table(&points).unwrap();

    let mut by_team: HashMap<&str, Vec<(u32, Option<f64>)>> = HashMap::new();
    for s in &unshifted {
        by_team.entry(s.team.as_str()).or_default().push((s.week, s.value));
    }
    for (team, mut entries) in by_team {
        entries.sort_by_key(|(week, _)| *week);
        assert_eq!(shifted.get(team, 2020, entries[0].0), None);
        for pair in entries.windows(2) {
            assert_eq!(shifted.get(team, 2020, pair[1].0), pair[0].1, "{team}");
        }
    }
}

const TEAMS: [(&str, &str); 4] = [("KC", "KAN"), ("BUF", "BUF"), ("GB", "GNB"), ("NE", "NWE")];

fn round_robin_season(season: i32) -> Vec<RawGame> {
    let pairings = [[(0, 1), (2, 3)], [(0, 2), (1, 3)], [(0, 3), (1, 2)]];
    let mut out = Vec::new();
    for week in 1..=6u32 {
        for (idx, (a, b)) in pairings[((week - 1) % 3) as usize].iter().enumerate() {
            let (away, home) = if week <= 3 { (*a, *b) } else { (*b, *a) };
            let home_score = 17 + ((week as i32 + idx as i32 * 2) % 9);
            let away_score = 10 + ((week as i32 * 2 + idx as i32) % 7);
            out.push(game(season, week, TEAMS[away].0, away_score, TEAMS[home].0, home_score));
        }
    }
    out
}

fn pfr_code(team: &str) -> &'static str {
    TEAMS
        .iter()
        .find(|(schedule, _)| *schedule == team)
        .map(|(_, pfr)| *pfr)
        .unwrap()
}

fn synthetic_boxscores(raw: &[RawGame]) -> BoxscoreTables {
    let mut tables = BoxscoreTables::default();
    for g in raw {
        let pfr = g.pfr.clone().unwrap();
        for (team, score) in [(&g.away_team, g.away_score.unwrap()), (&g.home_team, g.home_score.unwrap())] {
            let code = pfr_code(team).to_string();
            tables.drives.push(DriveRow {
                pfr: pfr.clone(),
                team: code.clone(),
                num: Some(1),
                quarter: Some(1),
                time: "15:00".to_string(),
                los: String::new(),
                plays: Some(8),
                length: "4:00".to_string(),
                net_yards: Some(50 + score),
                result: "Touchdown".to_string(),
            });
            tables.drives.push(DriveRow {
                pfr: pfr.clone(),
                team: code.clone(),
                num: Some(2),
                quarter: Some(2),
                time: "10:00".to_string(),
                los: String::new(),
                plays: Some(3),
                length: "1:30".to_string(),
                net_yards: Some(4),
                result: "Punt".to_string(),
            });
            let qb = format!("QB {code}");
            tables.player_offense.push(PlayerOffenseRow {
                pfr: pfr.clone(),
                player: qb.clone(),
                team: code.clone(),
                completions: 18 + score % 5,
                pass_attempts: 30,
                pass_yards: 180 + score * 3,
                pass_td: 1 + score % 2,
                interceptions: 1,
                sacks: 2,
                sack_yards: 11,
                pass_long: 40,
                qb_rating: None,
                rush_attempts: 2,
                rush_yards: 8,
                rush_td: 0,
                rush_long: 6,
                targets: 0,
                receptions: 0,
                rec_yards: 0,
                rec_td: 0,
                rec_long: 0,
                fumbles: 0,
                fumbles_lost: 0,
            });
            tables.starters.push(StarterRow {
                pfr: pfr.clone(),
                team: code,
                slot: "QB_1".to_string(),
                player: qb,
            });
        }
    }
    tables
}

fn features_for(seasons: std::ops::RangeInclusive<i32>) -> Vec<FeatureRow> {
    let raw = seasons.flat_map(round_robin_season).collect::<Vec<_>>();
    let tables = synthetic_boxscores(&raw);
    let games = transform_home_away(&clean_raw_games(&raw));
    let (rows, summary) = build_features(&games, &tables, 2019, NullPolicy::Mixed).unwrap();
    assert_eq!(summary.kept, rows.len());
    rows
}

#[test]
fn builds_mirrored_rows_for_weeks_past_the_warmup() {
    let rows = features_for(2020..=2020);
    // Weeks 5 and 6, two games each, two perspectives per game.
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r.week > 4));

    let mut by_game: HashMap<&str, Vec<&FeatureRow>> = HashMap::new();
    for r in &rows {
        by_game.entry(r.game_id.as_str()).or_default().push(r);
    }
    assert_eq!(by_game.len(), 4);
    for pair in by_game.values() {
        let (a, b) = (pair[0], pair[1]);
        assert_eq!(a.obj_team, b.adv_team);
        assert_eq!(a.result, -b.result);
        assert_eq!(a.target + b.target, 1);
        assert!((a.pythag_log5_net + b.pythag_log5_net).abs() < 1e-12);
        assert!((a.yards_play_net + b.yards_play_net).abs() < 1e-12);
        assert!((a.points_drive_net + b.points_drive_net).abs() < 1e-12);
        assert!((a.qb_rating_net + b.qb_rating_net).abs() < 1e-9);
        assert_ne!(a.obj_team_is_home, b.obj_team_is_home);
    }

    let mut sorted = rows.clone();
    nfl_forecast::dataset::sort_rows(&mut sorted);
    assert_eq!(sorted, rows);
}

#[test]
fn split_and_store_round_trip() {
    let rows = features_for(2019..=2021);
    let (train, test) = split_by_season(rows.clone(), 2021);
    assert_eq!(train.len() + test.len(), rows.len());
    assert!(train.iter().all(|r| r.season < 2021));
    assert!(test.iter().all(|r| r.season >= 2021));

    let dir = std::env::temp_dir().join(format!("nfl_pipeline_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let mut conn = store::open_db(&dir.join("train.db")).unwrap();
    store::write_feature_table(&mut conn, FeatureTable::Train, &train).unwrap();
    store::write_feature_table(&mut conn, FeatureTable::Test, &test).unwrap();
    let loaded_train = store::load_feature_table(&conn, FeatureTable::Train).unwrap();
    let loaded_test = store::load_feature_table(&conn, FeatureTable::Test).unwrap();
    assert_eq!(loaded_train, train);
    assert_eq!(loaded_test, test);
    drop(conn);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_drive_data_drops_rows_unless_imputed() {
    let raw = round_robin_season(2020);
    let mut tables = synthetic_boxscores(&raw);
    tables.drives.retain(|d| d.team != "KAN");
    let games = transform_home_away(&clean_raw_games(&raw));

    let (mixed, _) = build_features(&games, &tables, 2019, NullPolicy::Mixed).unwrap();
    assert!(mixed.iter().all(|r| r.obj_team != "KC" && r.adv_team != "KC"));

    let (imputed, _) = build_features(&games, &tables, 2019, NullPolicy::Impute).unwrap();
    assert_eq!(imputed.len(), 8);
}

#[test]
fn debut_starter_takes_mean_rating_under_mixed_policy() {
    let raw = round_robin_season(2020);
    let mut tables = synthetic_boxscores(&raw);
    // KC hosts GB in week 5 with a starter who has never played.
    let debut_game = "2020050kc";
    for s in tables.starters.iter_mut().filter(|s| s.pfr == debut_game && s.team == "KAN") {
        s.player = "QB Rookie".to_string();
    }
    for p in tables
        .player_offense
        .iter_mut()
        .filter(|p| p.pfr == debut_game && p.team == "KAN")
    {
        p.player = "QB Rookie".to_string();
    }
    let games = transform_home_away(&clean_raw_games(&raw));

    let qb = build_qb_table(&tables.player_offense, &tables.starters, &posteam_defteam_map(&games))
        .unwrap();
    assert_eq!(qb.get("KC", 2020, 5), None);
    let mean = qb.mean().unwrap();
    let gb = qb.get("GB", 2020, 5).unwrap();

    let (mixed, mixed_summary) = build_features(&games, &tables, 2019, NullPolicy::Mixed).unwrap();
    assert_eq!(mixed.len(), 8);
    let kc = mixed
        .iter()
        .find(|r| r.week == 5 && r.obj_team == "KC")
        .expect("debut starter row is kept");
    assert_eq!(kc.adv_team, "GB");
    assert_eq!(kc.qb_rating_net, round1(mean - gb));
    let gb_row = mixed
        .iter()
        .find(|r| r.week == 5 && r.obj_team == "GB")
        .unwrap();
    assert_eq!(gb_row.qb_rating_net, round1(gb - mean));

    let (dropped, summary) = build_features(&games, &tables, 2019, NullPolicy::Drop).unwrap();
    assert_eq!(dropped.len(), 6);
    assert_eq!(summary.dropped_missing, mixed_summary.dropped_missing + 2);
    assert!(dropped.iter().all(|r| r.game_id != "2020_05_GB_KC"));
}

#[test]
fn empty_stat_table_yields_no_values() {
    let table = StatTable::default();
    assert!(table.is_empty());
    assert_eq!(table.mean(), None);
}
