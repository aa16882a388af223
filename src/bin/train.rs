use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use simpitch_ml::artifacts::JsonArtifactStore;
use simpitch_ml::config::{self, EngineConfig};
use simpitch_ml::domain::DEFAULT_TRAIN_RATIO;
use simpitch_ml::regressor::FitReport;
use simpitch_ml::round_index::RoundIndex;
use simpitch_ml::service::{PredictionService, TrainingOptions};
use simpitch_ml::store::{RoundProvider, SqliteStore};
use simpitch_ml::trainer::ModelTrainer;

fn main() -> Result<()> {
    config::load_dotenv();
    let cfg = EngineConfig::from_env();
    config::init_logging(&cfg.log_level);

    let league_id = parse_arg("--league").ok_or_else(|| {
        anyhow!("usage: train --league <id> --avg <strength> --trust <games> [--ratio r] [--until n] [--seed s] [--db path]")
    })?;
    let league_avg_strength = parse_arg("--avg")
        .ok_or_else(|| anyhow!("--avg is required"))?
        .parse::<f64>()
        .context("parse --avg")?;
    let games_to_reach_trust = parse_arg("--trust")
        .ok_or_else(|| anyhow!("--trust is required"))?
        .parse::<i64>()
        .context("parse --trust")?;
    let train_ratio = parse_arg("--ratio")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_TRAIN_RATIO)
        .clamp(0.01, 1.0);
    let train_until_round_no = parse_arg("--until").and_then(|v| v.parse::<i64>().ok());
    let seed = parse_arg("--seed").and_then(|v| v.parse::<u64>().ok());
    let db_path = parse_arg("--db")
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.db_path.clone());

    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("open sqlite db {}", db_path.display()))?,
    );
    let trainer = ModelTrainer::new(
        Arc::new(JsonArtifactStore::new(cfg.storage_dir.clone())),
        cfg.regressor,
    );
    let service = PredictionService::new(store.clone(), store.clone(), store.clone(), trainer);

    let rounds = store.league_rounds(&league_id)?;
    if rounds.is_empty() {
        return Err(anyhow!("no rounds stored for league {league_id}"));
    }
    let index = RoundIndex::from_rounds(&rounds);
    let options = TrainingOptions {
        league_id: league_id.clone(),
        league_avg_strength,
        games_to_reach_trust,
        train_until_round_no,
        train_ratio,
        seed,
    };
    let (models, report) = service
        .train(&options, &rounds, &index)
        .context("training pass failed")?;

    println!("Training complete");
    println!("League: {league_id}");
    println!("Artifacts: {}", cfg.storage_dir.display());
    println!("Warm start: {}", report.warm_start);
    println!(
        "Samples: train={} test={}",
        report.train_samples, report.test_samples
    );
    println!("Schema: {}", models.feature_schema.join(", "));
    print_fit("home", report.home.as_ref());
    print_fit("away", report.away.as_ref());
    Ok(())
}

fn print_fit(label: &str, report: Option<&FitReport>) {
    let Some(report) = report else {
        println!("{label}: reused persisted model");
        return;
    };
    println!(
        "{label}: epochs={} train_dev={} eval_dev={}",
        report.epochs_run,
        fmt_dev(report.train_deviance),
        fmt_dev(report.eval_deviance)
    );
}

fn fmt_dev(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn parse_arg(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
