use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use simpitch_ml::artifacts::JsonArtifactStore;
use simpitch_ml::config::{self, EngineConfig};
use simpitch_ml::payload;
use simpitch_ml::service::PredictionService;
use simpitch_ml::simulation::SimulationStatus;
use simpitch_ml::store::SqliteStore;
use simpitch_ml::trainer::ModelTrainer;

fn main() -> Result<()> {
    config::load_dotenv();
    let cfg = EngineConfig::from_env();
    config::init_logging(&cfg.log_level);

    let request_path = parse_path_arg("--request")
        .ok_or_else(|| anyhow!("usage: simpitch_ml --request <file.json> [--db <path>]"))?;
    let db_path = parse_path_arg("--db").unwrap_or_else(|| cfg.db_path.clone());

    let raw = fs::read_to_string(&request_path)
        .with_context(|| format!("read request {}", request_path.display()))?;
    let request = payload::parse_predict_request(&raw).context("parse prediction request")?;

    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("open sqlite db {}", db_path.display()))?,
    );
    let trainer = ModelTrainer::new(
        Arc::new(JsonArtifactStore::new(cfg.storage_dir.clone())),
        cfg.regressor,
    );
    let service = Arc::new(PredictionService::new(
        store.clone(),
        store.clone(),
        store,
        trainer,
    ));

    let mut handle = service.spawn(request);
    while let Some(event) = handle.blocking_next_event() {
        match (event.status, event.result.as_ref()) {
            (SimulationStatus::Running, Some(result)) => {
                let draws = result
                    .simulated_match_rounds
                    .iter()
                    .filter(|m| m.is_draw)
                    .count();
                println!(
                    "{} #{} iteration={} matches={} draws={} took={:.2}ms",
                    event.status,
                    event.counter,
                    result.iteration_index,
                    result.simulated_match_rounds.len(),
                    draws,
                    result.execution_time.as_secs_f64() * 1000.0
                );
            }
            _ => println!("{} #{}", event.status, event.counter),
        }
    }

    let outcome = handle.blocking_outcome().context("simulation failed")?;
    println!("Iterations: {}", outcome.iterations());
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
