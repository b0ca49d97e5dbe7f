//! SQLite persistence for the scraped box-score tables and the train/test feature tables.
//!
//! Every write is a full replace inside one transaction, so rerunning a stage is idempotent.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params};

use crate::boxscore::{BoxscoreTables, DriveRow, PlayerOffenseRow, StarterRow, TeamStatsRow};
use crate::dataset::FeatureRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureTable {
    Train,
    Test,
}

impl FeatureTable {
    pub fn name(self) -> &'static str {
        match self {
            FeatureTable::Train => "train",
            FeatureTable::Test => "test",
        }
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("set journal mode")?;
    Ok(conn)
}

const PLAYER_OFFENSE_SCHEMA: &str = r#"
    DROP TABLE IF EXISTS player_offense;
    CREATE TABLE player_offense (
        player TEXT NOT NULL,
        team TEXT NOT NULL,
        completions INTEGER NOT NULL,
        pass_attempts INTEGER NOT NULL,
        pass_yards INTEGER NOT NULL,
        pass_td INTEGER NOT NULL,
        interceptions INTEGER NOT NULL,
        sacks INTEGER NOT NULL,
        sack_yards INTEGER NOT NULL,
        pass_long INTEGER NOT NULL,
        qb_rating REAL NULL,
        rush_attempts INTEGER NOT NULL,
        rush_yards INTEGER NOT NULL,
        rush_td INTEGER NOT NULL,
        rush_long INTEGER NOT NULL,
        targets INTEGER NOT NULL,
        receptions INTEGER NOT NULL,
        rec_yards INTEGER NOT NULL,
        rec_td INTEGER NOT NULL,
        rec_long INTEGER NOT NULL,
        fumbles INTEGER NOT NULL,
        fumbles_lost INTEGER NOT NULL,
        pfr TEXT NOT NULL
    );
    CREATE INDEX idx_player_offense_pfr ON player_offense(pfr, team);
"#;

const TEAM_STATS_SCHEMA: &str = r#"
    DROP TABLE IF EXISTS team_stats;
    CREATE TABLE team_stats (
        team TEXT NOT NULL,
        first_downs INTEGER NOT NULL,
        rush_yds_tds TEXT NOT NULL,
        cmp_att_yd_td_int TEXT NOT NULL,
        sacked_yards TEXT NOT NULL,
        net_pass_yards INTEGER NOT NULL,
        total_yards INTEGER NOT NULL,
        fumbles_lost TEXT NOT NULL,
        turnovers INTEGER NOT NULL,
        penalties_yards TEXT NOT NULL,
        third_down_conv TEXT NOT NULL,
        fourth_down_conv TEXT NOT NULL,
        time_of_possession TEXT NOT NULL,
        pfr TEXT NOT NULL
    );
"#;

const DRIVES_SCHEMA: &str = r#"
    DROP TABLE IF EXISTS drives;
    CREATE TABLE drives (
        num INTEGER NULL,
        quarter INTEGER NULL,
        time TEXT NOT NULL,
        los TEXT NOT NULL,
        plays INTEGER NULL,
        length TEXT NOT NULL,
        net_yards INTEGER NULL,
        result TEXT NOT NULL,
        team TEXT NOT NULL,
        pfr TEXT NOT NULL
    );
    CREATE INDEX idx_drives_pfr ON drives(pfr, team);
"#;

const STARTERS_SCHEMA: &str = r#"
    DROP TABLE IF EXISTS starters;
    CREATE TABLE starters (
        team TEXT NOT NULL,
        slot TEXT NOT NULL,
        player TEXT NOT NULL,
        pfr TEXT NOT NULL
    );
    CREATE INDEX idx_starters_pfr ON starters(pfr, team);
"#;

pub fn write_boxscore_tables(conn: &mut Connection, tables: &BoxscoreTables) -> Result<()> {
    let tx = conn.transaction().context("begin boxscore transaction")?;
    tx.execute_batch(PLAYER_OFFENSE_SCHEMA)
        .context("replace player_offense")?;
    tx.execute_batch(TEAM_STATS_SCHEMA).context("replace team_stats")?;
    tx.execute_batch(DRIVES_SCHEMA).context("replace drives")?;
    tx.execute_batch(STARTERS_SCHEMA).context("replace starters")?;

    insert_player_offense(&tx, &tables.player_offense)?;
    insert_team_stats(&tx, &tables.team_stats)?;
    insert_drives(&tx, &tables.drives)?;
    insert_starters(&tx, &tables.starters)?;
    tx.commit().context("commit boxscore transaction")?;
    Ok(())
}

fn insert_player_offense(tx: &Transaction<'_>, rows: &[PlayerOffenseRow]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            r#"
            INSERT INTO player_offense (
                player, team, completions, pass_attempts, pass_yards, pass_td,
                interceptions, sacks, sack_yards, pass_long, qb_rating,
                rush_attempts, rush_yards, rush_td, rush_long,
                targets, receptions, rec_yards, rec_td, rec_long,
                fumbles, fumbles_lost, pfr
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23
            )
            "#,
        )
        .context("prepare player_offense insert")?;
    for r in rows {
        stmt.execute(params![
            r.player,
            r.team,
            r.completions,
            r.pass_attempts,
            r.pass_yards,
            r.pass_td,
            r.interceptions,
            r.sacks,
            r.sack_yards,
            r.pass_long,
            r.qb_rating,
            r.rush_attempts,
            r.rush_yards,
            r.rush_td,
            r.rush_long,
            r.targets,
            r.receptions,
            r.rec_yards,
            r.rec_td,
            r.rec_long,
            r.fumbles,
            r.fumbles_lost,
            r.pfr,
        ])
        .context("insert player_offense row")?;
    }
    Ok(())
}

fn insert_team_stats(tx: &Transaction<'_>, rows: &[TeamStatsRow]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            r#"
            INSERT INTO team_stats (
                team, first_downs, rush_yds_tds, cmp_att_yd_td_int, sacked_yards,
                net_pass_yards, total_yards, fumbles_lost, turnovers, penalties_yards,
                third_down_conv, fourth_down_conv, time_of_possession, pfr
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .context("prepare team_stats insert")?;
    for r in rows {
        stmt.execute(params![
            r.team,
            r.first_downs,
            r.rush_yds_tds,
            r.cmp_att_yd_td_int,
            r.sacked_yards,
            r.net_pass_yards,
            r.total_yards,
            r.fumbles_lost,
            r.turnovers,
            r.penalties_yards,
            r.third_down_conv,
            r.fourth_down_conv,
            r.time_of_possession,
            r.pfr,
        ])
        .context("insert team_stats row")?;
    }
    Ok(())
}

fn insert_drives(tx: &Transaction<'_>, rows: &[DriveRow]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            r#"
            INSERT INTO drives (num, quarter, time, los, plays, length, net_yards, result, team, pfr)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .context("prepare drives insert")?;
    for r in rows {
        stmt.execute(params![
            r.num,
            r.quarter,
            r.time,
            r.los,
            r.plays,
            r.length,
            r.net_yards,
            r.result,
            r.team,
            r.pfr,
        ])
        .context("insert drive row")?;
    }
    Ok(())
}

fn insert_starters(tx: &Transaction<'_>, rows: &[StarterRow]) -> Result<()> {
    let mut stmt = tx
        .prepare("INSERT INTO starters (team, slot, player, pfr) VALUES (?1, ?2, ?3, ?4)")
        .context("prepare starters insert")?;
    for r in rows {
        stmt.execute(params![r.team, r.slot, r.player, r.pfr])
            .context("insert starter row")?;
    }
    Ok(())
}

pub fn load_boxscore_tables(conn: &Connection) -> Result<BoxscoreTables> {
    Ok(BoxscoreTables {
        player_offense: load_player_offense(conn)?,
        team_stats: load_team_stats(conn)?,
        drives: load_drives(conn)?,
        starters: load_starters(conn)?,
    })
}

fn load_player_offense(conn: &Connection) -> Result<Vec<PlayerOffenseRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                pfr, player, team, completions, pass_attempts, pass_yards, pass_td,
                interceptions, sacks, sack_yards, pass_long, qb_rating,
                rush_attempts, rush_yards, rush_td, rush_long,
                targets, receptions, rec_yards, rec_td, rec_long,
                fumbles, fumbles_lost
            FROM player_offense
            ORDER BY rowid ASC
            "#,
        )
        .context("prepare load player_offense")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerOffenseRow {
                pfr: row.get(0)?,
                player: row.get(1)?,
                team: row.get(2)?,
                completions: row.get(3)?,
                pass_attempts: row.get(4)?,
                pass_yards: row.get(5)?,
                pass_td: row.get(6)?,
                interceptions: row.get(7)?,
                sacks: row.get(8)?,
                sack_yards: row.get(9)?,
                pass_long: row.get(10)?,
                qb_rating: row.get(11)?,
                rush_attempts: row.get(12)?,
                rush_yards: row.get(13)?,
                rush_td: row.get(14)?,
                rush_long: row.get(15)?,
                targets: row.get(16)?,
                receptions: row.get(17)?,
                rec_yards: row.get(18)?,
                rec_td: row.get(19)?,
                rec_long: row.get(20)?,
                fumbles: row.get(21)?,
                fumbles_lost: row.get(22)?,
            })
        })
        .context("query player_offense")?;
    collect_rows(rows, "decode player_offense row")
}

fn load_team_stats(conn: &Connection) -> Result<Vec<TeamStatsRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                pfr, team, first_downs, rush_yds_tds, cmp_att_yd_td_int, sacked_yards,
                net_pass_yards, total_yards, fumbles_lost, turnovers, penalties_yards,
                third_down_conv, fourth_down_conv, time_of_possession
            FROM team_stats
            ORDER BY rowid ASC
            "#,
        )
        .context("prepare load team_stats")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TeamStatsRow {
                pfr: row.get(0)?,
                team: row.get(1)?,
                first_downs: row.get(2)?,
                rush_yds_tds: row.get(3)?,
                cmp_att_yd_td_int: row.get(4)?,
                sacked_yards: row.get(5)?,
                net_pass_yards: row.get(6)?,
                total_yards: row.get(7)?,
                fumbles_lost: row.get(8)?,
                turnovers: row.get(9)?,
                penalties_yards: row.get(10)?,
                third_down_conv: row.get(11)?,
                fourth_down_conv: row.get(12)?,
                time_of_possession: row.get(13)?,
            })
        })
        .context("query team_stats")?;
    collect_rows(rows, "decode team_stats row")
}

fn load_drives(conn: &Connection) -> Result<Vec<DriveRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT pfr, team, num, quarter, time, los, plays, length, net_yards, result
            FROM drives
            ORDER BY rowid ASC
            "#,
        )
        .context("prepare load drives")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DriveRow {
                pfr: row.get(0)?,
                team: row.get(1)?,
                num: row.get(2)?,
                quarter: row.get(3)?,
                time: row.get(4)?,
                los: row.get(5)?,
                plays: row.get(6)?,
                length: row.get(7)?,
                net_yards: row.get(8)?,
                result: row.get(9)?,
            })
        })
        .context("query drives")?;
    collect_rows(rows, "decode drive row")
}

fn load_starters(conn: &Connection) -> Result<Vec<StarterRow>> {
    let mut stmt = conn
        .prepare("SELECT pfr, team, slot, player FROM starters ORDER BY rowid ASC")
        .context("prepare load starters")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StarterRow {
                pfr: row.get(0)?,
                team: row.get(1)?,
                slot: row.get(2)?,
                player: row.get(3)?,
            })
        })
        .context("query starters")?;
    collect_rows(rows, "decode starter row")
}

fn feature_schema(table: FeatureTable) -> String {
    let name = table.name();
    format!(
        r#"
        DROP TABLE IF EXISTS {name};
        CREATE TABLE {name} (
            game_id TEXT NOT NULL,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            obj_team TEXT NOT NULL,
            adv_team TEXT NOT NULL,
            result INTEGER NOT NULL,
            obj_team_is_home INTEGER NOT NULL,
            rest_net REAL NOT NULL,
            yards_play_net REAL NOT NULL,
            points_drive_net REAL NOT NULL,
            pythag_log5_net REAL NOT NULL,
            qb_rating_net REAL NOT NULL,
            target INTEGER NOT NULL
        );
        "#
    )
}

pub fn write_feature_table(
    conn: &mut Connection,
    table: FeatureTable,
    rows: &[FeatureRow],
) -> Result<()> {
    let name = table.name();
    let tx = conn.transaction().context("begin feature transaction")?;
    tx.execute_batch(&feature_schema(table))
        .with_context(|| format!("replace {name} table"))?;
    {
        let mut stmt = tx
            .prepare(&format!(
                r#"
                INSERT INTO {name} (
                    game_id, season, week, obj_team, adv_team, result, obj_team_is_home,
                    rest_net, yards_play_net, points_drive_net, pythag_log5_net,
                    qb_rating_net, target
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#
            ))
            .with_context(|| format!("prepare {name} insert"))?;
        for r in rows {
            stmt.execute(params![
                r.game_id,
                r.season,
                r.week,
                r.obj_team,
                r.adv_team,
                r.result,
                bool_to_i64(r.obj_team_is_home),
                r.rest_net,
                r.yards_play_net,
                r.points_drive_net,
                r.pythag_log5_net,
                r.qb_rating_net,
                r.target,
            ])
            .with_context(|| format!("insert {name} row"))?;
        }
    }
    tx.commit().with_context(|| format!("commit {name} table"))?;
    Ok(())
}

pub fn load_feature_table(conn: &Connection, table: FeatureTable) -> Result<Vec<FeatureRow>> {
    let name = table.name();
    let mut stmt = conn
        .prepare(&format!(
            r#"
            SELECT
                game_id, season, week, obj_team, adv_team, result, obj_team_is_home,
                rest_net, yards_play_net, points_drive_net, pythag_log5_net,
                qb_rating_net, target
            FROM {name}
            ORDER BY season ASC, week ASC, game_id ASC, obj_team_is_home ASC
            "#
        ))
        .with_context(|| format!("prepare load {name}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FeatureRow {
                game_id: row.get(0)?,
                season: row.get(1)?,
                week: row.get(2)?,
                obj_team: row.get(3)?,
                adv_team: row.get(4)?,
                result: row.get(5)?,
                obj_team_is_home: row.get::<_, i64>(6)? != 0,
                rest_net: row.get(7)?,
                yards_play_net: row.get(8)?,
                points_drive_net: row.get(9)?,
                pythag_log5_net: row.get(10)?,
                qb_rating_net: row.get(11)?,
                target: row.get(12)?,
            })
        })
        .with_context(|| format!("query {name}"))?;
    collect_rows(rows, "decode feature row")
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    what: &'static str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(what)?);
    }
    Ok(out)
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn feature_row(game_id: &str, season: i32, home: bool) -> FeatureRow {
        FeatureRow {
            game_id: game_id.to_string(),
            season,
            week: 6,
            obj_team: if home { "KC" } else { "BUF" }.to_string(),
            adv_team: if home { "BUF" } else { "KC" }.to_string(),
            result: if home { 3 } else { -3 },
            obj_team_is_home: home,
            rest_net: 0.0,
            yards_play_net: 0.4,
            points_drive_net: 0.2,
            pythag_log5_net: 0.05,
            qb_rating_net: 4.5,
            target: if home { 1 } else { 0 },
        }
    }

    #[test]
    fn feature_table_round_trips_and_replaces() {
        let mut conn = memory_db();
        let rows = vec![feature_row("g1", 2019, false), feature_row("g1", 2019, true)];
        write_feature_table(&mut conn, FeatureTable::Train, &rows).unwrap();
        write_feature_table(&mut conn, FeatureTable::Train, &rows).unwrap();
        let loaded = load_feature_table(&conn, FeatureTable::Train).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn boxscore_tables_round_trip() {
        let mut conn = memory_db();
        let tables = BoxscoreTables {
            player_offense: vec![],
            team_stats: vec![],
            drives: vec![DriveRow {
                pfr: "g1".to_string(),
                team: "KAN".to_string(),
                num: Some(1),
                quarter: Some(1),
                time: "15:00".to_string(),
                los: "KAN 25".to_string(),
                plays: Some(8),
                length: "4:12".to_string(),
                net_yards: Some(75),
                result: "Touchdown".to_string(),
            }],
            starters: vec![StarterRow {
                pfr: "g1".to_string(),
                team: "KAN".to_string(),
                slot: "QB_1".to_string(),
                player: "Patrick Mahomes".to_string(),
            }],
        };
        write_boxscore_tables(&mut conn, &tables).unwrap();
        let loaded = load_boxscore_tables(&conn).unwrap();
        assert_eq!(loaded, tables);
    }
}
