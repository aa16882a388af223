use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use simpitch_ml::EngineError;
use simpitch_ml::artifacts::{JsonArtifactStore, ModelArtifactStore};
use simpitch_ml::features::{FEATURE_NAMES, FeatureRow, TrainingRecord, feature_schema};
use simpitch_ml::regressor::{PoissonRegressor, RegressorParams};
use simpitch_ml::split::TrainingDataset;
use simpitch_ml::trainer::{ModelTrainer, TrainedModels};

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<HashMap<String, TrainedModels>>,
}

impl ModelArtifactStore for MemoryStore {
    fn load(&self, league_id: &str) -> simpitch_ml::Result<Option<TrainedModels>> {
        Ok(self.saved.lock().expect("lock").get(league_id).cloned())
    }

    fn save(&self, league_id: &str, models: &TrainedModels) -> simpitch_ml::Result<()> {
        self.saved
            .lock()
            .expect("lock")
            .insert(league_id.to_string(), models.clone());
        Ok(())
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("simpitch_ml_{tag}_{}", uuid::Uuid::new_v4()))
}

fn record(i: usize) -> TrainingRecord {
    let strength = (i % 4) as f64;
    let values = FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(j, name)| (*name, strength * 0.5 + j as f64 * 0.01));
    TrainingRecord {
        x_row: FeatureRow::from_pairs(values),
        y_home: (i % 4) as u32,
        y_away: (3 - i % 4) as u32,
        prev_round_id: format!("r{}", i % 5 + 1),
    }
}

fn dataset(train: usize, test: usize) -> TrainingDataset {
    TrainingDataset {
        train: (0..train).map(record).collect(),
        test: (train..train + test).map(record).collect(),
    }
}

fn small_params() -> RegressorParams {
    RegressorParams {
        epochs: 20,
        ..RegressorParams::default()
    }
}

#[test]
fn cold_start_derives_schema_and_persists() {
    let store = Arc::new(MemoryStore::default());
    let trainer = ModelTrainer::new(store.clone(), small_params());

    let (models, report) = trainer
        .train_evaluate_and_save("L", Some(11), &dataset(80, 20), None)
        .expect("training succeeds");

    assert!(!report.warm_start);
    assert_eq!(report.train_samples, 80);
    assert_eq!(report.test_samples, 20);
    assert_eq!(models.feature_schema, feature_schema());
    assert!(report.home.as_ref().is_some_and(|r| r.eval_deviance.is_some()));
    assert_eq!(store.load("L").expect("load"), Some(models.clone()));

    let (raw_home, raw_away) = models.predict(&record(3).x_row);
    assert!(raw_home.is_finite() && raw_home > 0.0);
    assert!(raw_away.is_finite() && raw_away > 0.0);
}

#[test]
fn warm_start_keeps_persisted_schema() {
    let store = Arc::new(MemoryStore::default());
    let schema = vec!["home_p_off".to_string(), "legacy_col".to_string()];
    store
        .save(
            "L",
            &TrainedModels {
                home_model: PoissonRegressor::constant(schema.clone(), 1.2),
                away_model: PoissonRegressor::constant(schema.clone(), 0.9),
                feature_schema: schema.clone(),
                last_overview_created_date: None,
            },
        )
        .expect("seed store");
    let trainer = ModelTrainer::new(store.clone(), small_params());

    let (models, report) = trainer
        .train_evaluate_and_save("L", Some(3), &dataset(40, 0), None)
        .expect("training succeeds");

    assert!(report.warm_start);
    assert_eq!(models.feature_schema, schema);
    assert_eq!(models.home_model.feature_names, schema);
    assert_eq!(models.home_model.fits, 1);
    assert!(report.home.as_ref().is_some_and(|r| r.eval_deviance.is_none()));
}

#[test]
fn empty_train_reuses_persisted_models_or_fails() {
    let store = Arc::new(MemoryStore::default());
    let trainer = ModelTrainer::new(store.clone(), small_params());
    let empty = TrainingDataset::default();

    assert!(matches!(
        trainer.train_evaluate_and_save("L", None, &empty, None),
        Err(EngineError::NoTrainingData(_))
    ));

    let (first, _) = trainer
        .train_evaluate_and_save("L", Some(1), &dataset(30, 0), None)
        .expect("first pass");
    let (reused, report) = trainer
        .train_evaluate_and_save("L", Some(1), &empty, None)
        .expect("reuse");
    assert_eq!(reused, first);
    assert!(report.home.is_none());
}

#[test]
fn json_store_round_trips_and_reports_missing() {
    let dir = temp_dir("artifacts");
    let store = JsonArtifactStore::new(&dir);
    assert!(store.load("L-1").expect("load").is_none());

    let trainer = ModelTrainer::new(Arc::new(store.clone()), small_params());
    let (models, _) = trainer
        .train_evaluate_and_save("L-1", Some(5), &dataset(50, 10), None)
        .expect("training succeeds");

    assert!(store.home_path("L-1").exists());
    assert!(store.away_path("L-1").exists());
    assert!(store.meta_path("L-1").exists());
    let loaded = store.load("L-1").expect("load").expect("present");
    assert_eq!(loaded.feature_schema, models.feature_schema);
    assert_eq!(loaded.home_model.coeffs.len(), models.home_model.coeffs.len());
    for (a, b) in loaded.home_model.coeffs.iter().zip(&models.home_model.coeffs) {
        assert!((a - b).abs() < 1e-9);
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_artifacts_fall_back_to_cold_start() {
    let dir = temp_dir("corrupt");
    let store = JsonArtifactStore::new(&dir);
    fs::create_dir_all(&dir).expect("mkdir");
    for path in [store.home_path("L"), store.away_path("L"), store.meta_path("L")] {
        fs::write(path, "{ definitely not a model").expect("write");
    }
    assert!(store.load("L").is_err());

    let trainer = ModelTrainer::new(Arc::new(store.clone()), small_params());
    let (_, report) = trainer
        .train_evaluate_and_save("L", Some(2), &dataset(30, 5), None)
        .expect("cold start");
    assert!(!report.warm_start);
    assert!(store.load("L").expect("readable again").is_some());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn save_failure_is_fatal() {
    let blocker = temp_dir("blocker");
    fs::write(&blocker, "occupied").expect("write blocker file");
    let trainer = ModelTrainer::new(
        Arc::new(JsonArtifactStore::new(blocker.join("models"))),
        small_params(),
    );

    let err = trainer
        .train_evaluate_and_save("L", Some(2), &dataset(20, 0), None)
        .expect_err("save must fail");
    assert!(matches!(err, EngineError::ArtifactSave { .. }));

    let _ = fs::remove_file(&blocker);
}

#[test]
fn warm_start_applies_configured_params() {
    let store = Arc::new(MemoryStore::default());
    let stale = RegressorParams {
        epochs: 500,
        learning_rate: 0.5,
        ..RegressorParams::default()
    };
    let mut home_model = PoissonRegressor::constant(feature_schema(), 1.1);
    let mut away_model = PoissonRegressor::constant(feature_schema(), 0.9);
    home_model.params = stale;
    away_model.params = stale;
    store
        .save(
            "L",
            &TrainedModels {
                home_model,
                away_model,
                feature_schema: feature_schema(),
                last_overview_created_date: None,
            },
        )
        .expect("seed store");

    let configured = RegressorParams {
        epochs: 3,
        ..RegressorParams::default()
    };
    let trainer = ModelTrainer::new(store.clone(), configured);
    let (models, report) = trainer
        .train_evaluate_and_save("L", Some(4), &dataset(30, 0), None)
        .expect("training succeeds");

    assert!(report.warm_start);
    assert_eq!(models.home_model.params, configured);
    assert_eq!(models.away_model.params, configured);
    assert!(report.home.as_ref().is_some_and(|r| r.epochs_run <= 3));
}
