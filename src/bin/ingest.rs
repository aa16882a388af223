use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use simpitch_ml::config::{self, EngineConfig};
use simpitch_ml::payload;
use simpitch_ml::store::SqliteStore;

fn main() -> Result<()> {
    config::load_dotenv();
    let cfg = EngineConfig::from_env();
    config::init_logging(&cfg.log_level);

    let rounds_path = parse_path_arg("--rounds");
    let matches_path = parse_path_arg("--matches");
    if rounds_path.is_none() && matches_path.is_none() {
        return Err(anyhow!(
            "usage: ingest [--rounds <rounds.json>] [--matches <matches.json>] [--db <path>]"
        ));
    }
    let db_path = parse_path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;

    let mut rounds_upserted = 0usize;
    if let Some(path) = rounds_path {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read rounds {}", path.display()))?;
        let rounds = payload::parse_league_rounds_str(&raw).context("parse league rounds")?;
        rounds_upserted = store.upsert_league_rounds(&rounds)?;
    }

    let mut matches_upserted = 0usize;
    let mut matches_played = 0usize;
    if let Some(path) = matches_path {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read matches {}", path.display()))?;
        let matches = payload::parse_matches_str(&raw);
        matches_played = matches.iter().filter(|m| m.is_played).count();
        matches_upserted = store.upsert_match_rounds(&matches)?;
    }

    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    println!("Rounds upserted: {rounds_upserted}");
    println!("Matches upserted: {matches_upserted} (played {matches_played})");
    Ok(())
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
