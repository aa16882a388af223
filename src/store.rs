use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::domain::{self, IterationResult, LeagueRound, MatchRound, Synchronization};
use crate::error::{EngineError, Result};
use crate::payload;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub trait RoundProvider: Send + Sync {
    fn league_rounds(&self, league_id: &str) -> Result<Vec<LeagueRound>>;
    fn match_rounds(&self, round_id: &str) -> Result<Vec<MatchRound>>;
}

pub trait ResultStore: Send + Sync {
    fn iteration_results(&self, simulation_id: &str) -> Result<Vec<IterationResult>>;
    fn save_iteration_result(&self, league_id: &str, result: &IterationResult) -> Result<()>;
}

pub trait SyncStore: Send + Sync {
    fn last_sync(&self, league_id: &str) -> Result<Option<Synchronization>>;
    /// Simulation ids for the league created strictly after `since`, oldest first.
    fn simulations_since(&self, league_id: &str, since: Option<NaiveDateTime>)
    -> Result<Vec<String>>;
    fn record_sync(&self, sync: &Synchronization) -> Result<()>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Worker("sqlite connection lock poisoned".to_string()))
    }

    pub fn upsert_league_rounds(&self, rounds: &[LeagueRound]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0usize;
        for round in rounds {
            written += tx.execute(
                r#"
                INSERT INTO league_rounds (id, league_id, season_year, round_no)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    league_id = excluded.league_id,
                    season_year = excluded.season_year,
                    round_no = excluded.round_no
                "#,
                params![round.id, round.league_id, round.season_year, round.round],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn upsert_match_rounds(&self, matches: &[MatchRound]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0usize;
        for m in matches {
            written += tx.execute(
                r#"
                INSERT INTO match_rounds (
                    id, round_id, home_team_id, away_team_id,
                    home_goals, away_goals, is_draw, is_played
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    round_id = excluded.round_id,
                    home_team_id = excluded.home_team_id,
                    away_team_id = excluded.away_team_id,
                    home_goals = excluded.home_goals,
                    away_goals = excluded.away_goals,
                    is_draw = excluded.is_draw,
                    is_played = excluded.is_played
                "#,
                params![
                    m.id,
                    m.round_id,
                    m.home_team_id,
                    m.away_team_id,
                    m.home_goals.map(i64::from),
                    m.away_goals.map(i64::from),
                    bool_to_i64(m.is_draw),
                    bool_to_i64(m.is_played),
                ],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn register_simulation(
        &self,
        simulation_id: &str,
        league_id: &str,
        created_at: NaiveDateTime,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO simulations (id, league_id, created_at) VALUES (?1, ?2, ?3)",
            params![simulation_id, league_id, fmt_ts(created_at)],
        )?;
        Ok(())
    }
}

impl RoundProvider for SqliteStore {
    fn league_rounds(&self, league_id: &str) -> Result<Vec<LeagueRound>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, league_id, season_year, round_no FROM league_rounds \
             WHERE league_id = ?1 ORDER BY round_no",
        )?;
        let rows = stmt.query_map(params![league_id], |row| {
            Ok(LeagueRound {
                id: row.get(0)?,
                league_id: row.get(1)?,
                season_year: row.get(2)?,
                round: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn match_rounds(&self, round_id: &str) -> Result<Vec<MatchRound>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, round_id, home_team_id, away_team_id, home_goals, away_goals, \
             is_draw, is_played FROM match_rounds WHERE round_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![round_id], |row| {
            Ok(MatchRound {
                id: row.get(0)?,
                round_id: row.get(1)?,
                home_team_id: row.get(2)?,
                away_team_id: row.get(3)?,
                home_goals: goals(row.get::<_, Option<i64>>(4)?),
                away_goals: goals(row.get::<_, Option<i64>>(5)?),
                is_draw: row.get::<_, i64>(6)? != 0,
                is_played: row.get::<_, i64>(7)? != 0,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

impl ResultStore for SqliteStore {
    fn iteration_results(&self, simulation_id: &str) -> Result<Vec<IterationResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, iteration_index, start_date, execution_time_us, team_strengths, \
             simulated_match_rounds FROM iteration_results \
             WHERE simulation_id = ?1 ORDER BY iteration_index",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, index, start, micros, strengths, matches)| IterationResult {
                id,
                simulation_id: simulation_id.to_string(),
                iteration_index: usize::try_from(index).unwrap_or_default(),
                start_date: payload::parse_timestamp(&start)
                    .unwrap_or_else(domain::default_last_update)
                    .and_utc(),
                execution_time: Duration::from_micros(u64::try_from(micros).unwrap_or_default()),
                team_strengths: payload::parse_snapshots_str(&strengths),
                simulated_match_rounds: payload::parse_matches_str(&matches),
            })
            .collect())
    }

    fn save_iteration_result(&self, league_id: &str, result: &IterationResult) -> Result<()> {
        let strengths = serde_json::to_string(&result.team_strengths)?;
        let matches = serde_json::to_string(&result.simulated_match_rounds)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO simulations (id, league_id, created_at) VALUES (?1, ?2, ?3)",
            params![result.simulation_id, league_id, fmt_ts(Utc::now().naive_utc())],
        )?;
        tx.execute(
            r#"
            INSERT INTO iteration_results (
                id, simulation_id, iteration_index, start_date,
                execution_time_us, team_strengths, simulated_match_rounds
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                team_strengths = excluded.team_strengths,
                simulated_match_rounds = excluded.simulated_match_rounds,
                execution_time_us = excluded.execution_time_us
            "#,
            params![
                result.id,
                result.simulation_id,
                result.iteration_index as i64,
                result.start_date.to_rfc3339(),
                i64::try_from(result.execution_time.as_micros()).unwrap_or(i64::MAX),
                strengths,
                matches,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl SyncStore for SqliteStore {
    fn last_sync(&self, league_id: &str) -> Result<Option<Synchronization>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT last_sync_date, added_simulations FROM synchronizations \
                 WHERE league_id = ?1 ORDER BY last_sync_date DESC LIMIT 1",
                params![league_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(date, added)| {
            Some(Synchronization {
                league_id: league_id.to_string(),
                last_sync_date: payload::parse_timestamp(&date)?,
                added_simulations: u32::try_from(added).unwrap_or_default(),
            })
        }))
    }

    fn simulations_since(
        &self,
        league_id: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM simulations WHERE league_id = ?1 \
             AND (?2 IS NULL OR created_at > ?2) ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![league_id, since.map(fmt_ts)], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
    }

    fn record_sync(&self, sync: &Synchronization) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO synchronizations (league_id, last_sync_date, added_simulations) \
             VALUES (?1, ?2, ?3)",
            params![
                sync.league_id,
                fmt_ts(sync.last_sync_date),
                i64::from(sync.added_simulations)
            ],
        )?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS league_rounds (
            id TEXT PRIMARY KEY,
            league_id TEXT NOT NULL,
            season_year TEXT NOT NULL,
            round_no INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_league_rounds_league ON league_rounds(league_id);

        CREATE TABLE IF NOT EXISTS match_rounds (
            id TEXT PRIMARY KEY,
            round_id TEXT NOT NULL,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            is_draw INTEGER NOT NULL,
            is_played INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_match_rounds_round ON match_rounds(round_id);

        CREATE TABLE IF NOT EXISTS simulations (
            id TEXT PRIMARY KEY,
            league_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_simulations_created ON simulations(league_id, created_at);

        CREATE TABLE IF NOT EXISTS iteration_results (
            id TEXT PRIMARY KEY,
            simulation_id TEXT NOT NULL,
            iteration_index INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            execution_time_us INTEGER NOT NULL,
            team_strengths TEXT NOT NULL,
            simulated_match_rounds TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_iteration_results_sim ON iteration_results(simulation_id);

        CREATE TABLE IF NOT EXISTS synchronizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id TEXT NOT NULL,
            last_sync_date TEXT NOT NULL,
            added_simulations INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_synchronizations_league
            ON synchronizations(league_id, last_sync_date);
        "#,
    )?;
    Ok(())
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn goals(raw: Option<i64>) -> Option<u32> {
    raw.and_then(|g| u32::try_from(g).ok())
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
