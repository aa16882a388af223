use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::artifacts::ModelArtifactStore;
use crate::error::{EngineError, Result};
use crate::features::{FeatureMatrix, FeatureRow, TrainingRecord};
use crate::regressor::{FitReport, PoissonRegressor, RegressorParams};
use crate::split::TrainingDataset;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModels {
    pub home_model: PoissonRegressor,
    pub away_model: PoissonRegressor,
    pub feature_schema: Vec<String>,
    pub last_overview_created_date: Option<NaiveDateTime>,
}

impl TrainedModels {
    pub fn predict(&self, row: &FeatureRow) -> (f64, f64) {
        let x = row.conform(&self.feature_schema);
        (self.home_model.predict(&x), self.away_model.predict(&x))
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub warm_start: bool,
    pub train_samples: usize,
    pub test_samples: usize,
    pub home: Option<FitReport>,
    pub away: Option<FitReport>,
}

pub struct ModelTrainer {
    store: Arc<dyn ModelArtifactStore>,
    params: RegressorParams,
}

impl ModelTrainer {
    pub fn new(store: Arc<dyn ModelArtifactStore>, params: RegressorParams) -> Self {
        Self { store, params }
    }

    /// Persisted models for the league; load failures are treated as a cold start.
    pub fn load_existing(&self, league_id: &str) -> Option<TrainedModels> {
        match self.store.load(league_id) {
            Ok(found) => found,
            Err(err) => {
                warn!(league_id, error = %err, "model artifacts unreadable; cold start");
                None
            }
        }
    }

    pub fn train_evaluate_and_save(
        &self,
        league_id: &str,
        seed: Option<u64>,
        dataset: &TrainingDataset,
        trained_through: Option<NaiveDateTime>,
    ) -> Result<(TrainedModels, TrainingReport)> {
        let existing = self.load_existing(league_id);
        let warm_start = existing.is_some();

        if dataset.train.is_empty() {
            return match existing {
                Some(models) => {
                    info!(league_id, "no new training data; reusing persisted models");
                    let report = TrainingReport {
                        warm_start,
                        train_samples: 0,
                        test_samples: dataset.test.len(),
                        home: None,
                        away: None,
                    };
                    Ok((models, report))
                }
                None => Err(EngineError::NoTrainingData(league_id.to_string())),
            };
        }

        let train_x = FeatureMatrix::from_records(&dataset.train);
        let (mut home_model, mut away_model, feature_schema) = match existing {
            Some(models) => {
                info!(league_id, "warm-starting persisted models");
                let (mut home, mut away) = (models.home_model, models.away_model);
                home.params = self.params;
                away.params = self.params;
                (home, away, models.feature_schema)
            }
            None => {
                info!(league_id, "training fresh models");
                (
                    PoissonRegressor::new(self.params, seed),
                    PoissonRegressor::new(self.params, seed.map(|s| s.wrapping_add(1))),
                    train_x.columns.clone(),
                )
            }
        };

        let train_x = train_x.conform(&feature_schema);
        let test_x = FeatureMatrix::from_records(&dataset.test).conform(&feature_schema);
        let (train_home, train_away) = labels(&dataset.train);
        let (test_home, test_away) = labels(&dataset.test);
        let eval_home = (!dataset.test.is_empty()).then_some((&test_x, test_home.as_slice()));
        let eval_away = (!dataset.test.is_empty()).then_some((&test_x, test_away.as_slice()));

        let home = home_model.fit(&train_x, &train_home, eval_home);
        let away = away_model.fit(&train_x, &train_away, eval_away);
        info!(
            league_id,
            train = dataset.train.len(),
            test = dataset.test.len(),
            home_train_deviance = ?home.train_deviance,
            home_eval_deviance = ?home.eval_deviance,
            away_train_deviance = ?away.train_deviance,
            away_eval_deviance = ?away.eval_deviance,
            "models fitted"
        );

        let models = TrainedModels {
            home_model,
            away_model,
            feature_schema,
            last_overview_created_date: trained_through,
        };
        self.store.save(league_id, &models)?;

        let report = TrainingReport {
            warm_start,
            train_samples: dataset.train.len(),
            test_samples: dataset.test.len(),
            home: Some(home),
            away: Some(away),
        };
        Ok((models, report))
    }
}

fn labels(records: &[TrainingRecord]) -> (Vec<u32>, Vec<u32>) {
    records.iter().map(|r| (r.y_home, r.y_away)).unzip()
}
