use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::regressor::RegressorParams;

const APP_DIR: &str = "simpitch_ml";
const FALLBACK_STORAGE_DIR: &str = "./data_storage";
const DB_FILE: &str = "simpitch.sqlite";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub storage_dir: PathBuf,
    pub db_path: PathBuf,
    pub regressor: RegressorParams,
    pub log_level: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let storage_dir = env::var("STORAGE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(app_cache_dir)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STORAGE_DIR));
        let db_path = env::var("SIMPITCH_DB_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_dir.join(DB_FILE));

        let defaults = RegressorParams::default();
        let regressor = RegressorParams {
            epochs: env_parse("POISSON_EPOCHS", defaults.epochs).clamp(1, 10_000),
            learning_rate: env_parse("POISSON_LEARNING_RATE", defaults.learning_rate)
                .clamp(1e-5, 1.0),
            l2: env_parse("POISSON_L2", defaults.l2).clamp(0.0, 10.0),
            batch_size: env_parse("POISSON_BATCH_SIZE", defaults.batch_size).clamp(1, 65_536),
        };
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self {
            storage_dir,
            db_path,
            regressor,
            log_level,
        }
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},simpitch_ml={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
