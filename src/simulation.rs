use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{IterationResult, MatchRound, Side};
use crate::error::Result;
use crate::features::feature_row;
use crate::round_index::RoundIndex;
use crate::strength::StrengthResolver;
use crate::strength_map::StrengthMap;
use crate::trainer::TrainedModels;

pub const MAX_SIMULATED_GOALS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    Running,
    Completed,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationStatus::Running => f.write_str("RUNNING"),
            SimulationStatus::Completed => f.write_str("COMPLETED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionEvent {
    pub status: SimulationStatus,
    pub result: Option<IterationResult>,
    pub counter: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { iterations: usize },
    Cancelled { iterations: usize },
}

impl RunOutcome {
    pub fn iterations(self) -> usize {
        match self {
            RunOutcome::Completed { iterations } | RunOutcome::Cancelled { iterations } => {
                iterations
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn simulated_goals(raw: f64) -> u32 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, MAX_SIMULATED_GOALS).round() as u32
}

pub fn order_by_round(matches: &[MatchRound], index: &RoundIndex) -> Vec<MatchRound> {
    let mut ordered = matches.to_vec();
    ordered.sort_by_key(|m| index.round_no(&m.round_id).unwrap_or(i64::MAX));
    ordered
}

pub struct PredictionLoop<'a> {
    models: &'a TrainedModels,
    resolver: StrengthResolver<'a>,
    simulation_id: &'a str,
}

impl<'a> PredictionLoop<'a> {
    pub fn new(
        models: &'a TrainedModels,
        resolver: StrengthResolver<'a>,
        simulation_id: &'a str,
    ) -> Self {
        Self {
            models,
            resolver,
            simulation_id,
        }
    }

    pub fn simulate_iteration(
        &self,
        iteration_index: usize,
        seed: &StrengthMap,
        matches: &[MatchRound],
    ) -> Result<IterationResult> {
        let start_date = Utc::now();
        let timer = Instant::now();
        let index = self.resolver.index();

        let mut working = seed.clone();
        let mut simulated = Vec::with_capacity(matches.len());
        for fixture in matches {
            let prev_round_id = index.prev_round_or_self(&fixture.round_id);
            let home = self
                .resolver
                .resolve(&working, fixture, Side::Home, prev_round_id)?;
            let away = self
                .resolver
                .resolve(&working, fixture, Side::Away, prev_round_id)?;

            let (raw_home, raw_away) = self.models.predict(&feature_row(&home, &away));
            let played = fixture.with_score(simulated_goals(raw_home), simulated_goals(raw_away));

            let home_after = self.resolver.apply_outcome(&home, &played, Side::Home)?;
            let away_after = self.resolver.apply_outcome(&away, &played, Side::Away)?;
            working = working.with_snapshot(home_after).with_snapshot(away_after);
            simulated.push(played);
        }

        Ok(IterationResult {
            id: Uuid::new_v4().to_string(),
            simulation_id: self.simulation_id.to_string(),
            iteration_index,
            start_date,
            execution_time: timer.elapsed(),
            team_strengths: working.snapshots(),
            simulated_match_rounds: simulated,
        })
    }

    /// Cancellation is checked between passes; once seen, nothing more is emitted.
    pub fn run<F>(
        &self,
        iteration_count: usize,
        seed: &StrengthMap,
        matches: &[MatchRound],
        cancel: &CancellationToken,
        mut emit: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(PredictionEvent) -> Result<()>,
    {
        let mut counter = 0usize;
        for iteration_index in 0..iteration_count {
            if cancel.is_cancelled() {
                info!(simulation_id = self.simulation_id, counter, "simulation cancelled");
                return Ok(RunOutcome::Cancelled {
                    iterations: counter,
                });
            }
            let result = self.simulate_iteration(iteration_index, seed, matches)?;
            counter += 1;
            debug!(
                simulation_id = self.simulation_id,
                counter,
                elapsed_us = result.execution_time.as_micros() as u64,
                "iteration finished"
            );
            emit(PredictionEvent {
                status: SimulationStatus::Running,
                result: Some(result),
                counter,
            })?;
        }

        if cancel.is_cancelled() {
            info!(simulation_id = self.simulation_id, counter, "simulation cancelled");
            return Ok(RunOutcome::Cancelled {
                iterations: counter,
            });
        }
        emit(PredictionEvent {
            status: SimulationStatus::Completed,
            result: None,
            counter,
        })?;
        Ok(RunOutcome::Completed {
            iterations: counter,
        })
    }
}
