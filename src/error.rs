use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("games_to_reach_trust must be greater than zero (got {0})")]
    InvalidTrust(i64),

    #[error("cannot compute likelihood for team {team_id}: no matches played")]
    NoMatchesPlayed { team_id: String },

    #[error("match {match_id} has no recorded score")]
    MissingScore { match_id: String },

    #[error("match {match_id} is missing its {side} team id")]
    MissingTeam { match_id: String, side: &'static str },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no training data for league {0} and no persisted models to fall back on")]
    NoTrainingData(String),

    #[error("failed to save model artifacts for league {league_id}: {source}")]
    ArtifactSave {
        league_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("simulation worker: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
