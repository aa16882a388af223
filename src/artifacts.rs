use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain;
use crate::error::{EngineError, Result};
use crate::regressor::PoissonRegressor;
use crate::trainer::TrainedModels;

pub trait ModelArtifactStore: Send + Sync {
    fn load(&self, league_id: &str) -> Result<Option<TrainedModels>>;
    fn save(&self, league_id: &str, models: &TrainedModels) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactMeta {
    league_id: String,
    feature_schema: Vec<String>,
    #[serde(default)]
    last_overview_created_date: Option<NaiveDateTime>,
    #[serde(default)]
    saved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct JsonArtifactStore {
    dir: PathBuf,
}

impl JsonArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn home_path(&self, league_id: &str) -> PathBuf {
        self.dir
            .join(format!("poisson_home_{}.json", file_key(league_id)))
    }

    pub fn away_path(&self, league_id: &str) -> PathBuf {
        self.dir
            .join(format!("poisson_away_{}.json", file_key(league_id)))
    }

    pub fn meta_path(&self, league_id: &str) -> PathBuf {
        self.dir
            .join(format!("poisson_meta_{}.json", file_key(league_id)))
    }
}

impl ModelArtifactStore for JsonArtifactStore {
    fn load(&self, league_id: &str) -> Result<Option<TrainedModels>> {
        let paths = [
            self.home_path(league_id),
            self.away_path(league_id),
            self.meta_path(league_id),
        ];
        if paths.iter().any(|p| !p.exists()) {
            debug!(league_id, dir = %self.dir.display(), "no persisted models");
            return Ok(None);
        }
        let [home_path, away_path, meta_path] = paths;

        let home_model: PoissonRegressor = serde_json::from_str(&fs::read_to_string(home_path)?)?;
        let away_model: PoissonRegressor = serde_json::from_str(&fs::read_to_string(away_path)?)?;
        let meta: ArtifactMeta = serde_json::from_str(&fs::read_to_string(meta_path)?)?;

        Ok(Some(TrainedModels {
            home_model,
            away_model,
            feature_schema: meta.feature_schema,
            last_overview_created_date: meta.last_overview_created_date,
        }))
    }

    fn save(&self, league_id: &str, models: &TrainedModels) -> Result<()> {
        let meta = ArtifactMeta {
            league_id: league_id.to_string(),
            feature_schema: models.feature_schema.clone(),
            last_overview_created_date: models.last_overview_created_date,
            saved_at: Some(domain::now()),
        };
        let home = serde_json::to_vec_pretty(&models.home_model)?;
        let away = serde_json::to_vec_pretty(&models.away_model)?;
        let meta = serde_json::to_vec_pretty(&meta)?;

        let write_all = || -> std::io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            write_atomic(&self.home_path(league_id), &home)?;
            write_atomic(&self.away_path(league_id), &away)?;
            write_atomic(&self.meta_path(league_id), &meta)?;
            Ok(())
        };
        write_all().map_err(|source| EngineError::ArtifactSave {
            league_id: league_id.to_string(),
            source,
        })?;

        info!(league_id, dir = %self.dir.display(), "model artifacts saved");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

fn file_key(league_id: &str) -> String {
    league_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
