use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Round id used for "the round before the first one".
pub const NIL_ROUND_ID: &str = "00000000-0000-0000-0000-000000000000";

pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

pub fn default_last_update() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2001, 1, 1)
        .and_then(|d| d.and_hms_micro_opt(5, 14, 36, 246_303))
        .unwrap_or_default()
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthItem {
    pub offensive: f64,
    pub defensive: f64,
}

impl StrengthItem {
    pub fn new(offensive: f64, defensive: f64) -> Self {
        Self {
            offensive,
            defensive,
        }
    }

    pub fn uniform(value: f64) -> Self {
        Self::new(value, value)
    }
}

impl Default for StrengthItem {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonStats {
    pub id: String,
    pub team_id: String,
    pub season_year: String,
    pub league_id: String,
    /// Absent until first estimated; falls back to the league average.
    pub league_strength: Option<f64>,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRound {
    pub id: String,
    pub round_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub is_draw: bool,
    pub is_played: bool,
}

impl MatchRound {
    pub fn score(&self) -> Option<(u32, u32)> {
        Some((self.home_goals?, self.away_goals?))
    }

    pub fn is_completed(&self) -> bool {
        self.score().is_some()
    }

    pub fn team_id(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team_id,
            Side::Away => &self.away_team_id,
        }
    }

    pub fn goals_for_against(&self, side: Side) -> Option<(u32, u32)> {
        let (home, away) = self.score()?;
        Some(match side {
            Side::Home => (home, away),
            Side::Away => (away, home),
        })
    }

    pub fn with_score(&self, home_goals: u32, away_goals: u32) -> Self {
        Self {
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
            is_draw: home_goals == away_goals,
            is_played: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueRound {
    pub id: String,
    pub league_id: String,
    pub season_year: String,
    pub round: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthSnapshot {
    pub team_id: String,
    pub round_id: String,
    pub likelihood: StrengthItem,
    pub posterior: StrengthItem,
    pub expected_goals: f64,
    pub last_update: NaiveDateTime,
    pub season_stats: SeasonStats,
}

impl StrengthSnapshot {
    pub fn baseline(
        team_id: &str,
        round_id: &str,
        league_id: &str,
        league_avg_strength: f64,
        last_update: NaiveDateTime,
    ) -> Self {
        Self {
            team_id: team_id.to_string(),
            round_id: round_id.to_string(),
            likelihood: StrengthItem::uniform(league_avg_strength),
            posterior: StrengthItem::uniform(league_avg_strength),
            expected_goals: league_avg_strength,
            last_update,
            season_stats: SeasonStats {
                team_id: team_id.to_string(),
                league_id: league_id.to_string(),
                league_strength: Some(league_avg_strength),
                ..SeasonStats::default()
            },
        }
    }

    pub fn with_round_meta(&self, round_id: &str, last_update: NaiveDateTime) -> Self {
        Self {
            round_id: round_id.to_string(),
            last_update,
            ..self.clone()
        }
    }

    pub fn with_incremented_stats(&self, played: &MatchRound, side: Side) -> Result<Self> {
        let (scored, conceded) =
            played
                .goals_for_against(side)
                .ok_or_else(|| EngineError::MissingScore {
                    match_id: played.id.clone(),
                })?;
        let mut stats = self.season_stats.clone();
        stats.matches_played += 1;
        stats.goals_for += scored;
        stats.goals_against += conceded;
        if scored > conceded {
            stats.wins += 1;
        } else if scored < conceded {
            stats.losses += 1;
        } else {
            stats.draws += 1;
        }
        Ok(Self {
            season_stats: stats,
            ..self.clone()
        })
    }

    pub fn with_likelihood(&self) -> Result<Self> {
        let stats = &self.season_stats;
        if stats.matches_played == 0 {
            return Err(EngineError::NoMatchesPlayed {
                team_id: self.team_id.clone(),
            });
        }
        let n = f64::from(stats.matches_played);
        Ok(Self {
            likelihood: StrengthItem::new(
                f64::from(stats.goals_for) / n,
                f64::from(stats.goals_against) / n,
            ),
            ..self.clone()
        })
    }

    /// Empirical-Bayes shrinkage toward the blended league strength with
    /// `games_to_reach_trust` virtual prior matches.
    pub fn with_posterior(&self, games_to_reach_trust: i64, league_avg_strength: f64) -> Result<Self> {
        if games_to_reach_trust <= 0 {
            return Err(EngineError::InvalidTrust(games_to_reach_trust));
        }
        let mut stats = self.season_stats.clone();
        let stored = stats.league_strength.unwrap_or(league_avg_strength);
        let blended = (stored + league_avg_strength) / 2.0;
        stats.league_strength = Some(blended);

        let beta0 = games_to_reach_trust as f64;
        let alpha0 = beta0 * blended;
        let n = f64::from(stats.matches_played);
        let posterior = StrengthItem::new(
            (alpha0 + f64::from(stats.goals_for)) / (beta0 + n),
            (alpha0 + f64::from(stats.goals_against)) / (beta0 + n),
        );
        Ok(Self {
            posterior,
            expected_goals: posterior.offensive,
            season_stats: stats,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub simulation_id: String,
    pub league_id: String,
    pub iteration_count: usize,
    pub team_strengths: Vec<StrengthSnapshot>,
    pub matches_to_simulate: Vec<MatchRound>,
    pub train_until_round_no: Option<i64>,
    pub train_ratio: Option<f64>,
    pub league_avg_strength: f64,
    pub seed: Option<u64>,
    pub games_to_reach_trust: i64,
}

impl PredictRequest {
    pub fn validate(&self) -> Result<()> {
        if self.games_to_reach_trust <= 0 {
            return Err(EngineError::InvalidTrust(self.games_to_reach_trust));
        }
        if self.league_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("league_id is empty".to_string()));
        }
        if !self.league_avg_strength.is_finite() || self.league_avg_strength < 0.0 {
            return Err(EngineError::InvalidRequest(format!(
                "league_avg_strength must be a non-negative number (got {})",
                self.league_avg_strength
            )));
        }
        if let Some(ratio) = self.train_ratio
            && !(ratio > 0.0 && ratio <= 1.0)
        {
            return Err(EngineError::InvalidRequest(format!(
                "train_ratio must be in (0, 1] (got {ratio})"
            )));
        }
        Ok(())
    }

    pub fn effective_train_ratio(&self) -> f64 {
        self.train_ratio.unwrap_or(DEFAULT_TRAIN_RATIO)
    }
}

#[derive(Debug, Clone)]
pub struct IterationResult {
    pub id: String,
    pub simulation_id: String,
    pub iteration_index: usize,
    pub start_date: DateTime<Utc>,
    pub execution_time: Duration,
    pub team_strengths: Vec<StrengthSnapshot>,
    pub simulated_match_rounds: Vec<MatchRound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synchronization {
    pub league_id: String,
    pub last_sync_date: NaiveDateTime,
    pub added_simulations: u32,
}
