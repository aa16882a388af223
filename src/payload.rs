//! Ingestion boundary for snapshot, match and request payloads.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{
    self, LeagueRound, MatchRound, NIL_ROUND_ID, PredictRequest, SeasonStats, StrengthItem,
    StrengthSnapshot,
};
use crate::error::Result;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Deserialize)]
struct StrengthItemPayload {
    #[serde(default, alias = "Offensive", alias = "Item1")]
    offensive: Option<f64>,
    #[serde(default, alias = "Defensive", alias = "Item2")]
    defensive: Option<f64>,
}

impl StrengthItemPayload {
    fn into_item(self) -> StrengthItem {
        let fallback = StrengthItem::default();
        StrengthItem::new(
            self.offensive.unwrap_or(fallback.offensive),
            self.defensive.unwrap_or(fallback.defensive),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SeasonStatsPayload {
    #[serde(default, alias = "Id")]
    id: Option<String>,
    #[serde(default, alias = "TeamId", alias = "teamId")]
    team_id: Option<String>,
    #[serde(default, alias = "SeasonYear", alias = "seasonYear")]
    season_year: Option<Value>,
    #[serde(default, alias = "LeagueId", alias = "leagueId")]
    league_id: Option<String>,
    #[serde(default, alias = "LeagueStrength", alias = "leagueStrength")]
    league_strength: Option<f64>,
    #[serde(default, alias = "MatchesPlayed", alias = "matchesPlayed")]
    matches_played: Option<u32>,
    #[serde(default, alias = "Wins")]
    wins: Option<u32>,
    #[serde(default, alias = "Losses")]
    losses: Option<u32>,
    #[serde(default, alias = "Draws")]
    draws: Option<u32>,
    #[serde(default, alias = "GoalsFor", alias = "goalsFor")]
    goals_for: Option<u32>,
    #[serde(default, alias = "GoalsAgainst", alias = "goalsAgainst")]
    goals_against: Option<u32>,
}

impl SeasonStatsPayload {
    fn into_stats(self) -> SeasonStats {
        let season_year = season_year_text(self.season_year);
        SeasonStats {
            id: self.id.unwrap_or_default(),
            team_id: self.team_id.unwrap_or_default(),
            season_year,
            league_id: self.league_id.unwrap_or_default(),
            league_strength: self.league_strength,
            matches_played: self.matches_played.unwrap_or(0),
            wins: self.wins.unwrap_or(0),
            losses: self.losses.unwrap_or(0),
            draws: self.draws.unwrap_or(0),
            goals_for: self.goals_for.unwrap_or(0),
            goals_against: self.goals_against.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    #[serde(default, alias = "TeamId", alias = "teamId")]
    team_id: Option<String>,
    #[serde(default, alias = "RoundId", alias = "roundId")]
    round_id: Option<String>,
    #[serde(default, alias = "Likelihood")]
    likelihood: Option<StrengthItemPayload>,
    #[serde(default, alias = "Posterior")]
    posterior: Option<StrengthItemPayload>,
    #[serde(default, alias = "ExpectedGoals", alias = "expectedGoals")]
    expected_goals: Option<f64>,
    #[serde(default, alias = "LastUpdate", alias = "lastUpdate")]
    last_update: Option<String>,
    #[serde(default, alias = "SeasonStats", alias = "seasonStats")]
    season_stats: Option<SeasonStatsPayload>,
}

impl SnapshotPayload {
    fn into_snapshot(self) -> Option<StrengthSnapshot> {
        let team_id = self.team_id.filter(|id| !id.trim().is_empty())?;
        let last_update = self
            .last_update
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(domain::default_last_update);
        let mut season_stats = self
            .season_stats
            .map(SeasonStatsPayload::into_stats)
            .unwrap_or_default();
        if season_stats.team_id.is_empty() {
            season_stats.team_id = team_id.clone();
        }
        Some(StrengthSnapshot {
            round_id: self
                .round_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| NIL_ROUND_ID.to_string()),
            likelihood: self
                .likelihood
                .map(StrengthItemPayload::into_item)
                .unwrap_or_default(),
            posterior: self
                .posterior
                .map(StrengthItemPayload::into_item)
                .unwrap_or_default(),
            expected_goals: self.expected_goals.unwrap_or(0.0),
            last_update,
            season_stats,
            team_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MatchRoundPayload {
    #[serde(default, alias = "Id")]
    id: Option<String>,
    #[serde(default, alias = "RoundId", alias = "roundId")]
    round_id: Option<String>,
    #[serde(default, alias = "HomeTeamId", alias = "homeTeamId")]
    home_team_id: Option<String>,
    #[serde(default, alias = "AwayTeamId", alias = "awayTeamId")]
    away_team_id: Option<String>,
    #[serde(default, alias = "HomeGoals", alias = "homeGoals")]
    home_goals: Option<u32>,
    #[serde(default, alias = "AwayGoals", alias = "awayGoals")]
    away_goals: Option<u32>,
    #[serde(default, alias = "IsDraw", alias = "isDraw")]
    is_draw: Option<bool>,
    #[serde(default, alias = "IsPlayed", alias = "isPlayed")]
    is_played: Option<bool>,
}

impl MatchRoundPayload {
    fn into_match(self) -> Option<MatchRound> {
        let round_id = self.round_id.filter(|id| !id.trim().is_empty())?;
        let completed = self.home_goals.is_some() && self.away_goals.is_some();
        Some(MatchRound {
            id: self.id.unwrap_or_default(),
            round_id,
            home_team_id: self.home_team_id.unwrap_or_default(),
            away_team_id: self.away_team_id.unwrap_or_default(),
            is_draw: self
                .is_draw
                .unwrap_or(completed && self.home_goals == self.away_goals),
            is_played: self.is_played.unwrap_or(completed),
            home_goals: self.home_goals,
            away_goals: self.away_goals,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LeagueRoundPayload {
    #[serde(alias = "Id")]
    id: String,
    #[serde(default, alias = "LeagueId", alias = "leagueId")]
    league_id: Option<String>,
    #[serde(default, alias = "SeasonYear", alias = "seasonYear")]
    season_year: Option<Value>,
    #[serde(alias = "Round", alias = "round_no", alias = "RoundNo")]
    round: i64,
}

#[derive(Debug, Deserialize)]
struct PredictRequestPayload {
    #[serde(alias = "SimulationId", alias = "simulationId")]
    simulation_id: String,
    #[serde(alias = "LeagueId", alias = "leagueId")]
    league_id: String,
    #[serde(alias = "IterationCount", alias = "iterationCount")]
    iteration_count: usize,
    #[serde(default, alias = "TeamStrengths", alias = "teamStrengths")]
    team_strengths: Value,
    #[serde(default, alias = "MatchesToSimulate", alias = "matchesToSimulate")]
    matches_to_simulate: Value,
    #[serde(default, alias = "TrainUntilRoundNo", alias = "trainUntilRoundNo")]
    train_until_round_no: Option<i64>,
    #[serde(default, alias = "TrainRatio", alias = "trainRatio")]
    train_ratio: Option<f64>,
    #[serde(alias = "LeagueAvgStrength", alias = "leagueAvgStrength")]
    league_avg_strength: f64,
    #[serde(default, alias = "Seed")]
    seed: Option<u64>,
    #[serde(alias = "GamesToReachTrust", alias = "gamesToReachTrust")]
    games_to_reach_trust: i64,
}

fn season_year_text(raw: Option<Value>) -> String {
    match raw {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn parse_snapshots(value: &Value) -> Vec<StrengthSnapshot> {
    let mut out = Vec::new();
    collect_snapshots(value, &mut out);
    out
}

pub fn parse_snapshots_str(raw: &str) -> Vec<StrengthSnapshot> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => parse_snapshots(&value),
        Err(err) => {
            warn!(error = %err, "strength payload is not valid json; ignoring");
            Vec::new()
        }
    }
}

fn collect_snapshots(value: &Value, out: &mut Vec<StrengthSnapshot>) {
    match value {
        Value::Null => {}
        Value::String(raw) => out.extend(parse_snapshots_str(raw)),
        Value::Array(items) => {
            for item in items {
                if let Some(snapshot) = snapshot_entry(item) {
                    out.push(snapshot);
                }
            }
        }
        Value::Object(map) if looks_like_snapshot(map) => {
            if let Some(snapshot) = snapshot_entry(value) {
                out.push(snapshot);
            }
        }
        Value::Object(map) => {
            for group in map.values() {
                match group {
                    Value::Array(_) => collect_snapshots(group, out),
                    Value::Object(_) => {
                        if let Some(snapshot) = snapshot_entry(group) {
                            out.push(snapshot);
                        }
                    }
                    other => warn!(entry = %other, "unexpected strength group; dropped"),
                }
            }
        }
        other => warn!(entry = %other, "unexpected strength payload shape; dropped"),
    }
}

fn looks_like_snapshot(map: &serde_json::Map<String, Value>) -> bool {
    ["team_id", "TeamId", "teamId"]
        .iter()
        .any(|key| map.contains_key(*key))
}

fn snapshot_entry(item: &Value) -> Option<StrengthSnapshot> {
    let payload = match SnapshotPayload::deserialize(item) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "malformed strength snapshot dropped");
            return None;
        }
    };
    let snapshot = payload.into_snapshot();
    if snapshot.is_none() {
        warn!("strength snapshot without team id dropped");
    }
    snapshot
}

pub fn parse_matches(value: &Value) -> Vec<MatchRound> {
    match value {
        Value::Null => Vec::new(),
        Value::String(raw) => parse_matches_str(raw),
        Value::Array(items) => items.iter().filter_map(match_entry).collect(),
        Value::Object(_) => match_entry(value).into_iter().collect(),
        other => {
            warn!(entry = %other, "unexpected match payload shape; dropped");
            Vec::new()
        }
    }
}

pub fn parse_matches_str(raw: &str) -> Vec<MatchRound> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => parse_matches(&value),
        Err(err) => {
            warn!(error = %err, "match payload is not valid json; ignoring");
            Vec::new()
        }
    }
}

fn match_entry(item: &Value) -> Option<MatchRound> {
    let payload = match MatchRoundPayload::deserialize(item) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "malformed match dropped");
            return None;
        }
    };
    let parsed = payload.into_match();
    if parsed.is_none() {
        warn!("match without round id dropped");
    }
    parsed
}

pub fn parse_league_rounds_str(raw: &str) -> Result<Vec<LeagueRound>> {
    let value: Value = serde_json::from_str(raw)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .iter()
        .filter_map(|item| match LeagueRoundPayload::deserialize(item) {
            Ok(payload) => Some(LeagueRound {
                id: payload.id,
                league_id: payload.league_id.unwrap_or_default(),
                season_year: season_year_text(payload.season_year),
                round: payload.round,
            }),
            Err(err) => {
                warn!(error = %err, "malformed league round dropped");
                None
            }
        })
        .collect())
}

/// Parses and validates a prediction request. `league_avg_strength` and
/// `games_to_reach_trust` are required.
pub fn parse_predict_request(raw: &str) -> Result<PredictRequest> {
    let payload: PredictRequestPayload = serde_json::from_str(raw)?;
    let team_strengths = parse_snapshots(&payload.team_strengths);
    let matches_to_simulate = parse_matches(&payload.matches_to_simulate);
    debug!(
        simulation_id = %payload.simulation_id,
        snapshots = team_strengths.len(),
        matches = matches_to_simulate.len(),
        "prediction request parsed"
    );

    let request = PredictRequest {
        simulation_id: payload.simulation_id,
        league_id: payload.league_id,
        iteration_count: payload.iteration_count,
        team_strengths,
        matches_to_simulate,
        train_until_round_no: payload.train_until_round_no.filter(|no| *no > 0),
        train_ratio: payload.train_ratio,
        league_avg_strength: payload.league_avg_strength,
        seed: payload.seed,
        games_to_reach_trust: payload.games_to_reach_trust,
    };
    request.validate()?;
    Ok(request)
}
