use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::domain::{self, IterationResult, LeagueRound, MatchRound, PredictRequest, Synchronization};
use crate::error::{EngineError, Result};
use crate::features::{TrainingRecord, build_training_records};
use crate::round_index::RoundIndex;
use crate::simulation::{
    CancellationToken, PredictionEvent, PredictionLoop, RunOutcome, order_by_round,
};
use crate::split::{TrainingDataset, split_by_round};
use crate::store::{ResultStore, RoundProvider, SyncStore};
use crate::strength::StrengthResolver;
use crate::strength_map::StrengthMap;
use crate::trainer::{ModelTrainer, TrainedModels, TrainingReport};

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub league_id: String,
    pub league_avg_strength: f64,
    pub games_to_reach_trust: i64,
    pub train_until_round_no: Option<i64>,
    pub train_ratio: f64,
    pub seed: Option<u64>,
}

impl From<&PredictRequest> for TrainingOptions {
    fn from(request: &PredictRequest) -> Self {
        Self {
            league_id: request.league_id.clone(),
            league_avg_strength: request.league_avg_strength,
            games_to_reach_trust: request.games_to_reach_trust,
            train_until_round_no: request.train_until_round_no,
            train_ratio: request.effective_train_ratio(),
            seed: request.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedTraining {
    pub dataset: TrainingDataset,
    pub simulation_ids: Vec<String>,
    pub synced_until: NaiveDateTime,
}

pub struct PredictionService {
    rounds: Arc<dyn RoundProvider>,
    results: Arc<dyn ResultStore>,
    sync: Arc<dyn SyncStore>,
    trainer: ModelTrainer,
}

impl PredictionService {
    pub fn new(
        rounds: Arc<dyn RoundProvider>,
        results: Arc<dyn ResultStore>,
        sync: Arc<dyn SyncStore>,
        trainer: ModelTrainer,
    ) -> Self {
        Self {
            rounds,
            results,
            sync,
            trainer,
        }
    }

    pub fn trainer(&self) -> &ModelTrainer {
        &self.trainer
    }

    pub fn init_prediction(
        &self,
        options: &TrainingOptions,
        rounds: &[LeagueRound],
        index: &RoundIndex,
    ) -> Result<PreparedTraining> {
        let resolver = StrengthResolver::new(
            index,
            &options.league_id,
            options.league_avg_strength,
            options.games_to_reach_trust,
        )?;
        let synced_until = domain::now();
        let since = self
            .sync
            .last_sync(&options.league_id)?
            .map(|s| s.last_sync_date);
        let simulation_ids = self.sync.simulations_since(&options.league_id, since)?;
        info!(
            league_id = %options.league_id,
            since = ?since,
            simulations = simulation_ids.len(),
            "collecting training simulations"
        );

        let played = self.played_matches(rounds)?;
        let historical = simulation_ids
            .iter()
            .flat_map(|id| match self.results.iteration_results(id) {
                Ok(results) => results,
                Err(err) => {
                    warn!(simulation_id = %id, error = %err, "iteration results unavailable; skipping");
                    Vec::new()
                }
            })
            .collect::<Vec<_>>();

        let records = historical
            .par_iter()
            .map(|result| records_for_result(result, &played, &resolver))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let dataset = split_by_round(
            records,
            index,
            options.train_until_round_no,
            options.train_ratio,
        );
        Ok(PreparedTraining {
            dataset,
            simulation_ids,
            synced_until,
        })
    }

    pub fn train(
        &self,
        options: &TrainingOptions,
        rounds: &[LeagueRound],
        index: &RoundIndex,
    ) -> Result<(TrainedModels, TrainingReport)> {
        let prepared = self.init_prediction(options, rounds, index)?;
        let (models, report) = self.trainer.train_evaluate_and_save(
            &options.league_id,
            options.seed,
            &prepared.dataset,
            Some(prepared.synced_until),
        )?;

        if !prepared.simulation_ids.is_empty() {
            let sync = Synchronization {
                league_id: options.league_id.clone(),
                last_sync_date: prepared.synced_until,
                added_simulations: u32::try_from(prepared.simulation_ids.len()).unwrap_or(u32::MAX),
            };
            if let Err(err) = self.sync.record_sync(&sync) {
                warn!(error = %err, "failed to record synchronization");
            }
        }
        Ok((models, report))
    }

    /// Each iteration result is persisted before its event is emitted.
    pub fn run_blocking<F>(
        &self,
        request: &PredictRequest,
        cancel: &CancellationToken,
        mut emit: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(PredictionEvent) -> Result<()>,
    {
        request.validate()?;
        let rounds = self.rounds.league_rounds(&request.league_id)?;
        let index = RoundIndex::from_rounds(&rounds);
        let (models, _) = self.train(&TrainingOptions::from(request), &rounds, &index)?;

        let resolver = StrengthResolver::new(
            &index,
            &request.league_id,
            request.league_avg_strength,
            request.games_to_reach_trust,
        )?;
        let seed_map = StrengthMap::from_snapshots(request.team_strengths.iter().cloned());
        let matches = order_by_round(&request.matches_to_simulate, &index);
        info!(
            simulation_id = %request.simulation_id,
            iterations = request.iteration_count,
            matches = matches.len(),
            "starting simulation"
        );

        let prediction = PredictionLoop::new(&models, resolver, &request.simulation_id);
        prediction.run(
            request.iteration_count,
            &seed_map,
            &matches,
            cancel,
            |event| {
                if let Some(result) = event.result.as_ref() {
                    self.results
                        .save_iteration_result(&request.league_id, result)?;
                }
                emit(event)
            },
        )
    }

    /// Runs the request on a dedicated worker thread. Dropping the handle's
    /// event receiver cancels the run at the next iteration boundary.
    pub fn spawn(self: &Arc<Self>, request: PredictRequest) -> SimulationHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let simulation_id = request.simulation_id.clone();

        let service = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("simulation-{simulation_id}"))
            .spawn(move || {
                let outcome = service.run_blocking(&request, &worker_cancel, |event| {
                    if event_tx.send(event).is_err() {
                        worker_cancel.cancel();
                    }
                    Ok(())
                });
                if let Err(err) = &outcome {
                    error!(simulation_id = %request.simulation_id, error = %err, "simulation failed");
                }
                let _ = outcome_tx.send(outcome);
            });
        if let Err(err) = spawned {
            error!(simulation_id = %simulation_id, error = %err, "failed to start simulation worker");
        }

        SimulationHandle {
            simulation_id,
            events: event_rx,
            outcome: outcome_rx,
            cancel,
        }
    }

    fn played_matches(&self, rounds: &[LeagueRound]) -> Result<Vec<MatchRound>> {
        let mut out = Vec::new();
        for round in rounds {
            out.extend(
                self.rounds
                    .match_rounds(&round.id)?
                    .into_iter()
                    .filter(|m| m.is_played),
            );
        }
        Ok(out)
    }
}

fn records_for_result(
    result: &IterationResult,
    played: &[MatchRound],
    resolver: &StrengthResolver<'_>,
) -> Vec<TrainingRecord> {
    let map = StrengthMap::from_snapshots(result.team_strengths.iter().cloned());
    let matches = merge_matches(played, &result.simulated_match_rounds);
    build_training_records(&matches, &map, resolver)
}

fn merge_matches(scheduled: &[MatchRound], simulated: &[MatchRound]) -> Vec<MatchRound> {
    let by_id = simulated
        .iter()
        .filter(|m| !m.id.is_empty())
        .map(|m| (m.id.as_str(), m))
        .collect::<HashMap<_, _>>();
    let mut out = scheduled
        .iter()
        .map(|m| by_id.get(m.id.as_str()).map_or_else(|| m.clone(), |s| (*s).clone()))
        .collect::<Vec<_>>();
    out.extend(
        simulated
            .iter()
            .filter(|m| m.id.is_empty() || !scheduled.iter().any(|s| s.id == m.id))
            .cloned(),
    );
    out
}

pub struct SimulationHandle {
    simulation_id: String,
    events: mpsc::UnboundedReceiver<PredictionEvent>,
    outcome: oneshot::Receiver<Result<RunOutcome>>,
    cancel: CancellationToken,
}

impl SimulationHandle {
    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<PredictionEvent> {
        self.events.recv().await
    }

    /// Blocking variant for synchronous callers; must not run inside an async runtime.
    pub fn blocking_next_event(&mut self) -> Option<PredictionEvent> {
        self.events.blocking_recv()
    }

    pub async fn outcome(self) -> Result<RunOutcome> {
        self.outcome
            .await
            .map_err(|_| EngineError::Worker("worker exited without reporting".to_string()))?
    }

    pub fn blocking_outcome(self) -> Result<RunOutcome> {
        self.outcome
            .blocking_recv()
            .map_err(|_| EngineError::Worker("worker exited without reporting".to_string()))?
    }
}
