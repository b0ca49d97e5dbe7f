//! Box-score pages: fetching, caching as files, and parsing the four stat tables.
//!
//! Several tables on the page ship inside HTML comments and are only revealed
//! client-side, so lookups search the body first and then a document built from
//! the concatenated comments.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::http_client::{fetch_text, http_client};

const BOXSCORE_URL: &str = "https://www.pro-football-reference.com/boxscores";
const PAGE_EXT: &str = "html";

#[derive(Debug, Error, PartialEq)]
pub enum BoxscoreError {
    #[error("table `{0}` not found")]
    MissingTable(&'static str),
    #[error("table `{0}` has no header row")]
    MissingHeader(&'static str),
    #[error("table `{table}` is missing column `{column}`")]
    MissingColumn { table: &'static str, column: String },
    #[error("table `{table}` row {row} has {found} cells, expected {expected}")]
    RowWidth {
        table: &'static str,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("table `{table}` column `{column}` has bad value {value:?}")]
    BadValue {
        table: &'static str,
        column: String,
        value: String,
    },
    #[error("team_stats header does not name two teams")]
    MissingTeams,
    #[error("invalid selector: {0}")]
    Selector(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOffenseRow {
    pub pfr: String,
    pub player: String,
    pub team: String,
    pub completions: i32,
    pub pass_attempts: i32,
    pub pass_yards: i32,
    pub pass_td: i32,
    pub interceptions: i32,
    pub sacks: i32,
    pub sack_yards: i32,
    pub pass_long: i32,
    pub qb_rating: Option<f64>,
    pub rush_attempts: i32,
    pub rush_yards: i32,
    pub rush_td: i32,
    pub rush_long: i32,
    pub targets: i32,
    pub receptions: i32,
    pub rec_yards: i32,
    pub rec_td: i32,
    pub rec_long: i32,
    pub fumbles: i32,
    pub fumbles_lost: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStatsRow {
    pub pfr: String,
    pub team: String,
    pub first_downs: i32,
    pub rush_yds_tds: String,
    pub cmp_att_yd_td_int: String,
    pub sacked_yards: String,
    pub net_pass_yards: i32,
    pub total_yards: i32,
    pub fumbles_lost: String,
    pub turnovers: i32,
    pub penalties_yards: String,
    pub third_down_conv: String,
    pub fourth_down_conv: String,
    pub time_of_possession: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveRow {
    pub pfr: String,
    pub team: String,
    pub num: Option<i32>,
    pub quarter: Option<i32>,
    pub time: String,
    pub los: String,
    pub plays: Option<i32>,
    pub length: String,
    pub net_yards: Option<i32>,
    pub result: String,
}

impl DriveRow {
    pub fn outcome(&self) -> DriveResult {
        DriveResult::classify(&self.result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveResult {
    Touchdown,
    FieldGoal,
    Other,
}

impl DriveResult {
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("touchdown") {
            DriveResult::Touchdown
        } else if raw.eq_ignore_ascii_case("field goal") {
            DriveResult::FieldGoal
        } else {
            DriveResult::Other
        }
    }

    /// Points credited to the offense. Turnovers returned for scores count as zero.
    pub fn points(self) -> i32 {
        match self {
            DriveResult::Touchdown => 7,
            DriveResult::FieldGoal => 3,
            DriveResult::Other => 0,
        }
    }
}

/// One starter in long form; `slot` is the position plus its ordinal (`QB_1`, `WR_2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterRow {
    pub pfr: String,
    pub team: String,
    pub slot: String,
    pub player: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxscoreTables {
    pub player_offense: Vec<PlayerOffenseRow>,
    pub team_stats: Vec<TeamStatsRow>,
    pub drives: Vec<DriveRow>,
    pub starters: Vec<StarterRow>,
}

impl BoxscoreTables {
    pub fn extend(&mut self, other: BoxscoreTables) {
        self.player_offense.extend(other.player_offense);
        self.team_stats.extend(other.team_stats);
        self.drives.extend(other.drives);
        self.starters.extend(other.starters);
    }

    /// Orders rows the way they are persisted.
    pub fn sort(&mut self) {
        self.player_offense.sort_by(|a, b| {
            a.pfr
                .cmp(&b.pfr)
                .then_with(|| a.team.cmp(&b.team))
                .then_with(|| b.pass_attempts.cmp(&a.pass_attempts))
                .then_with(|| b.rush_attempts.cmp(&a.rush_attempts))
                .then_with(|| b.targets.cmp(&a.targets))
        });
        self.team_stats
            .sort_by(|a, b| a.pfr.cmp(&b.pfr).then_with(|| a.team.cmp(&b.team)));
        self.drives.sort_by(|a, b| {
            a.pfr
                .cmp(&b.pfr)
                .then_with(|| a.team.cmp(&b.team))
                .then_with(|| a.num.unwrap_or(i32::MAX).cmp(&b.num.unwrap_or(i32::MAX)))
        });
        self.starters
            .sort_by(|a, b| a.pfr.cmp(&b.pfr).then_with(|| a.team.cmp(&b.team)));
    }
}

pub fn boxscore_url(pfr_id: &str) -> String {
    format!("{BOXSCORE_URL}/{pfr_id}.htm")
}

#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub requested: usize,
    pub already_cached: usize,
    pub fetched: usize,
    pub errors: Vec<String>,
}

/// Fetches every page not already cached in `dir`, sleeping `delay` before each request.
///
/// Failures are recorded and the loop moves on; nothing is retried, a rerun picks up
/// whatever is still missing.
pub fn fetch_missing_boxscores(
    pfr_ids: &[String],
    dir: &Path,
    delay: Duration,
) -> Result<FetchSummary> {
    fs::create_dir_all(dir).with_context(|| format!("create boxscore dir {}", dir.display()))?;
    let existing = cached_ids(dir)?;
    let client = http_client()?;

    let mut summary = FetchSummary {
        requested: pfr_ids.len(),
        ..FetchSummary::default()
    };
    let mut seen = HashSet::new();
    for pfr_id in pfr_ids {
        if !seen.insert(pfr_id.as_str()) {
            continue;
        }
        if existing.contains(pfr_id) {
            summary.already_cached += 1;
            continue;
        }
        info!(pfr_id = %pfr_id, "fetching boxscore");
        std::thread::sleep(delay);
        match fetch_text(client, &boxscore_url(pfr_id)) {
            Ok(html) => {
                write_page(dir, pfr_id, &html)?;
                summary.fetched += 1;
            }
            Err(err) => {
                warn!(pfr_id = %pfr_id, error = %err, "boxscore fetch failed");
                summary.errors.push(format!("{pfr_id}: {err:#}"));
            }
        }
    }
    Ok(summary)
}

fn page_path(dir: &Path, pfr_id: &str) -> PathBuf {
    dir.join(format!("{pfr_id}.{PAGE_EXT}"))
}

/// Temp file then rename: an interrupted write never counts as a cached page.
fn write_page(dir: &Path, pfr_id: &str, html: &str) -> Result<PathBuf> {
    let path = page_path(dir, pfr_id);
    let tmp = path.with_extension(format!("{PAGE_EXT}.tmp"));
    fs::write(&tmp, html).with_context(|| format!("write boxscore {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("swap boxscore {}", path.display()))?;
    Ok(path)
}

/// Pfr ids with a cached page in `dir`, sorted.
pub fn cached_page_ids(dir: &Path) -> Result<Vec<String>> {
    let mut ids = cached_ids(dir)?.into_iter().collect::<Vec<_>>();
    ids.sort();
    Ok(ids)
}

fn cached_ids(dir: &Path) -> Result<HashSet<String>> {
    let mut out = HashSet::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("read boxscore dir {}", dir.display()))?;
    for entry in entries {
        let path = entry.context("read boxscore dir entry")?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.insert(stem.to_string());
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct ParseSummary {
    pub tables: BoxscoreTables,
    pub parsed: usize,
    pub errors: Vec<String>,
}

/// Parses every cached page. A page that fails contributes no rows at all.
pub fn parse_boxscore_dir(dir: &Path) -> Result<ParseSummary> {
    let mut summary = ParseSummary::default();
    for pfr_id in cached_page_ids(dir)? {
        let path = page_path(dir, &pfr_id);
        let html = fs::read_to_string(&path)
            .with_context(|| format!("read boxscore {}", path.display()))?;
        match parse_boxscore(&html, &pfr_id) {
            Ok(tables) => {
                summary.tables.extend(tables);
                summary.parsed += 1;
            }
            Err(err) => {
                warn!(pfr_id = %pfr_id, error = %err, "skipping boxscore");
                summary.errors.push(format!("{pfr_id}: {err}"));
            }
        }
    }
    summary.tables.sort();
    Ok(summary)
}

pub fn parse_boxscore(html: &str, pfr_id: &str) -> Result<BoxscoreTables, BoxscoreError> {
    let page = Html::parse_document(html);
    let comments = Html::parse_document(&commented_html(&page));
    let docs = [&page, &comments];

    let player_offense = parse_player_offense(find_table(&docs, "player_offense")?, pfr_id)?;
    let (team_stats, away, home) = parse_team_stats(find_table(&docs, "team_stats")?, pfr_id)?;

    let mut drives = parse_drives(find_table(&docs, "vis_drives")?, "vis_drives", &away, pfr_id)?;
    drives.extend(parse_drives(
        find_table(&docs, "home_drives")?,
        "home_drives",
        &home,
        pfr_id,
    )?);

    let mut starters = parse_starters(
        find_table(&docs, "vis_starters")?,
        "vis_starters",
        &away,
        pfr_id,
    )?;
    starters.extend(parse_starters(
        find_table(&docs, "home_starters")?,
        "home_starters",
        &home,
        pfr_id,
    )?);

    Ok(BoxscoreTables {
        player_offense,
        team_stats,
        drives,
        starters,
    })
}

fn commented_html(page: &Html) -> String {
    let mut buf = String::new();
    for node in page.tree.values() {
        if let Node::Comment(c) = node {
            buf.push_str(&c.comment);
            buf.push('\n');
        }
    }
    buf
}

fn selector(raw: &str) -> Result<Selector, BoxscoreError> {
    Selector::parse(raw).map_err(|e| BoxscoreError::Selector(format!("{raw}: {e:?}")))
}

fn find_table<'a>(docs: &[&'a Html], id: &'static str) -> Result<ElementRef<'a>, BoxscoreError> {
    let sel = selector(&format!("table#{id}"))?;
    docs.iter()
        .copied()
        .find_map(|doc| doc.select(&sel).next())
        .ok_or(BoxscoreError::MissingTable(id))
}

fn table_rows(table: ElementRef<'_>) -> Result<Vec<Vec<String>>, BoxscoreError> {
    let tr = selector("tr")?;
    let cells = selector("th, td")?;
    Ok(table
        .select(&tr)
        .map(|row| row.select(&cells).map(cell_text).collect::<Vec<_>>())
        .collect())
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let raw = cell.text().collect::<String>();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

const PLAYER_OFFENSE_WIDTH: usize = 22;

fn parse_player_offense(
    table: ElementRef<'_>,
    pfr_id: &str,
) -> Result<Vec<PlayerOffenseRow>, BoxscoreError> {
    const TABLE: &str = "player_offense";
    let mut out = Vec::new();
    for (idx, row) in table_rows(table)?.into_iter().enumerate() {
        // Over-headers have an empty first cell; repeated column headers start with "Player".
        match row.first().map(String::as_str) {
            None | Some("") | Some("Player") => continue,
            _ => {}
        }
        if row.len() != PLAYER_OFFENSE_WIDTH {
            return Err(BoxscoreError::RowWidth {
                table: TABLE,
                row: idx,
                found: row.len(),
                expected: PLAYER_OFFENSE_WIDTH,
            });
        }
        let n = |i: usize| lenient_int(&row[i]);
        out.push(PlayerOffenseRow {
            pfr: pfr_id.to_string(),
            player: row[0].clone(),
            team: row[1].clone(),
            completions: n(2),
            pass_attempts: n(3),
            pass_yards: n(4),
            pass_td: n(5),
            interceptions: n(6),
            sacks: n(7),
            sack_yards: n(8),
            pass_long: n(9),
            qb_rating: row[10].parse::<f64>().ok(),
            rush_attempts: n(11),
            rush_yards: n(12),
            rush_td: n(13),
            rush_long: n(14),
            targets: n(15),
            receptions: n(16),
            rec_yards: n(17),
            rec_td: n(18),
            rec_long: n(19),
            fumbles: n(20),
            fumbles_lost: n(21),
        });
    }
    Ok(out)
}

fn parse_team_stats(
    table: ElementRef<'_>,
    pfr_id: &str,
) -> Result<(Vec<TeamStatsRow>, String, String), BoxscoreError> {
    const TABLE: &str = "team_stats";
    let mut rows = table_rows(table)?.into_iter();
    let header = rows.next().ok_or(BoxscoreError::MissingHeader(TABLE))?;
    let (away, home) = match header.as_slice() {
        [_, away, home, ..] if !away.is_empty() && !home.is_empty() => {
            (away.clone(), home.clone())
        }
        _ => return Err(BoxscoreError::MissingTeams),
    };

    let mut stats: HashMap<String, (String, String)> = HashMap::new();
    for (idx, row) in rows.enumerate() {
        if row.len() < 3 {
            return Err(BoxscoreError::RowWidth {
                table: TABLE,
                row: idx + 1,
                found: row.len(),
                expected: 3,
            });
        }
        stats.insert(row[0].clone(), (row[1].clone(), row[2].clone()));
    }

    let text = |name: &str, home_side: bool| -> String {
        stats
            .get(name)
            .map(|(a, h)| if home_side { h.clone() } else { a.clone() })
            .unwrap_or_default()
    };
    let int = |name: &str, home_side: bool| -> Result<i32, BoxscoreError> {
        let (a, h) = stats.get(name).ok_or_else(|| BoxscoreError::MissingColumn {
            table: TABLE,
            column: name.to_string(),
        })?;
        let raw = if home_side { h } else { a };
        strict_int(raw).ok_or_else(|| BoxscoreError::BadValue {
            table: TABLE,
            column: name.to_string(),
            value: raw.clone(),
        })
    };

    let mut out = Vec::with_capacity(2);
    for (team, home_side) in [(&away, false), (&home, true)] {
        out.push(TeamStatsRow {
            pfr: pfr_id.to_string(),
            team: team.clone(),
            first_downs: int("First Downs", home_side)?,
            rush_yds_tds: text("Rush-Yds-TDs", home_side),
            cmp_att_yd_td_int: text("Cmp-Att-Yd-TD-INT", home_side),
            sacked_yards: text("Sacked-Yards", home_side),
            net_pass_yards: int("Net Pass Yards", home_side)?,
            total_yards: int("Total Yards", home_side)?,
            fumbles_lost: text("Fumbles-Lost", home_side),
            turnovers: int("Turnovers", home_side)?,
            penalties_yards: text("Penalties-Yards", home_side),
            third_down_conv: text("Third Down Conv.", home_side),
            fourth_down_conv: text("Fourth Down Conv.", home_side),
            time_of_possession: text("Time of Possession", home_side),
        });
    }
    Ok((out, away, home))
}

fn parse_drives(
    table: ElementRef<'_>,
    name: &'static str,
    team: &str,
    pfr_id: &str,
) -> Result<Vec<DriveRow>, BoxscoreError> {
    let mut rows = table_rows(table)?.into_iter();
    let mut header = rows.next().ok_or(BoxscoreError::MissingHeader(name))?;
    if let Some(first) = header.first_mut() {
        *first = "num".to_string();
    }
    let col = |column: &str| -> Result<usize, BoxscoreError> {
        header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| BoxscoreError::MissingColumn {
                table: name,
                column: column.to_string(),
            })
    };
    let (num, quarter, time, los) = (col("num")?, col("Quarter")?, col("Time")?, col("LOS")?);
    let (plays, length, net, result) = (col("Plays")?, col("Length")?, col("Net Yds")?, col("Result")?);
    let width = header.len();

    let mut out = Vec::new();
    for (idx, row) in rows.enumerate() {
        if row.len() != width {
            return Err(BoxscoreError::RowWidth {
                table: name,
                row: idx + 1,
                found: row.len(),
                expected: width,
            });
        }
        out.push(DriveRow {
            pfr: pfr_id.to_string(),
            team: team.to_string(),
            num: strict_int(&row[num]),
            quarter: strict_int(&row[quarter]),
            time: row[time].clone(),
            los: row[los].clone(),
            plays: strict_int(&row[plays]),
            length: row[length].clone(),
            net_yards: strict_int(&row[net]),
            result: row[result].clone(),
        });
    }
    Ok(out)
}

fn parse_starters(
    table: ElementRef<'_>,
    name: &'static str,
    team: &str,
    pfr_id: &str,
) -> Result<Vec<StarterRow>, BoxscoreError> {
    let mut rows = table_rows(table)?.into_iter();
    let header = rows.next().ok_or(BoxscoreError::MissingHeader(name))?;
    let find = |column: &str| -> Result<usize, BoxscoreError> {
        header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| BoxscoreError::MissingColumn {
                table: name,
                column: column.to_string(),
            })
    };
    let player_idx = find("Player")?;
    let pos_idx = find("Pos")?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for (idx, row) in rows.enumerate() {
        let (Some(player), Some(pos)) = (row.get(player_idx), row.get(pos_idx)) else {
            return Err(BoxscoreError::RowWidth {
                table: name,
                row: idx + 1,
                found: row.len(),
                expected: header.len(),
            });
        };
        let n = counts.entry(pos.clone()).or_insert(0);
        *n += 1;
        out.push(StarterRow {
            pfr: pfr_id.to_string(),
            team: team.to_string(),
            slot: format!("{pos}_{n}"),
            player: player.clone(),
        });
    }
    Ok(out)
}

fn strict_int(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}

fn lenient_int(raw: &str) -> i32 {
    strict_int(raw).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_cache_counts_only_completed_writes() {
        let dir = std::env::temp_dir().join(format!("nfl_page_cache_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let path = write_page(&dir, "202010110kan", "<html></html>").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
        assert!(!path.with_extension("html.tmp").exists());

        // A write that died before the rename leaves only the temp file behind.
        fs::write(dir.join("202010110buf.html.tmp"), "<ht").unwrap();
        assert_eq!(cached_page_ids(&dir).unwrap(), vec!["202010110kan".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn drive_results_map_to_points() {
        assert_eq!(DriveResult::classify("Touchdown").points(), 7);
        assert_eq!(DriveResult::classify(" Field goal ").points(), 3);
        assert_eq!(DriveResult::classify("Punt").points(), 0);
        assert_eq!(DriveResult::classify("Interception").points(), 0);
    }

    #[test]
    fn missing_player_offense_is_loud() {
        let err = parse_boxscore("<html><body><p>nothing</p></body></html>", "x").unwrap_err();
        assert_eq!(err, BoxscoreError::MissingTable("player_offense"));
    }

    #[test]
    fn cell_text_collapses_whitespace() {
        let doc = Html::parse_fragment("<table><tr><td>\n  Patrick \n Mahomes </td></tr></table>");
        let td = Selector::parse("td").unwrap();
        let cell = doc.select(&td).next().unwrap();
        assert_eq!(cell_text(cell), "Patrick Mahomes");
    }

    #[test]
    fn starters_get_position_ordinals() {
        let html = r#"<table id="vis_starters">
            <tr><th>Player</th><th>Pos</th></tr>
            <tr><th>A</th><td>WR</td></tr>
            <tr><th>B</th><td>QB</td></tr>
            <tr><th>C</th><td>WR</td></tr>
        </table>"#;
        let doc = Html::parse_document(html);
        let table = find_table(&[&doc], "vis_starters").unwrap();
        let rows = parse_starters(table, "vis_starters", "KAN", "g1").unwrap();
        let slots = rows.iter().map(|r| r.slot.as_str()).collect::<Vec<_>>();
        assert_eq!(slots, vec!["WR_1", "QB_1", "WR_2"]);
    }
}
