use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http_client::{fetch_text, http_client};

/// One row of the nflverse schedule file. Extra columns in the file are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGame {
    pub game_id: String,
    pub season: i32,
    pub game_type: String,
    pub week: u32,
    pub away_team: String,
    pub away_score: Option<i32>,
    pub home_team: String,
    pub home_score: Option<i32>,
    /// Home score minus away score.
    pub result: Option<i32>,
    #[serde(default)]
    pub away_rest: Option<i32>,
    #[serde(default)]
    pub home_rest: Option<i32>,
    #[serde(default)]
    pub pfr: Option<String>,
}

/// Downloads the schedule CSV and swaps it into place.
pub fn refresh_games_data(url: &str, path: &Path) -> Result<usize> {
    let client = http_client()?;
    let body = fetch_text(client, url).context("fetch schedule csv")?;
    // Parse before replacing so a broken download never clobbers a good file.
    let games = parse_raw_games(body.as_bytes())?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schedule dir {}", parent.display()))?;
    }
    let tmp = path.with_extension("csv.tmp");
    fs::write(&tmp, &body).context("write schedule csv")?;
    fs::rename(&tmp, path).context("swap schedule csv")?;
    info!(rows = games.len(), path = %path.display(), "schedule refreshed");
    Ok(games.len())
}

pub fn load_raw_games(path: &Path) -> Result<Vec<RawGame>> {
    let file = fs::File::open(path)
        .with_context(|| format!("open schedule csv {}", path.display()))?;
    parse_raw_games(file)
}

pub fn parse_raw_games(reader: impl Read) -> Result<Vec<RawGame>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for (idx, record) in rdr.deserialize::<RawGame>().enumerate() {
        let game = record.with_context(|| format!("decode schedule row {}", idx + 1))?;
        out.push(game);
    }
    Ok(out)
}
