use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use simpitch_ml::EngineError;
use simpitch_ml::artifacts::ModelArtifactStore;
use simpitch_ml::domain::{
    IterationResult, LeagueRound, MatchRound, PredictRequest, SeasonStats, StrengthItem,
    StrengthSnapshot,
};
use simpitch_ml::payload::parse_timestamp;
use simpitch_ml::regressor::RegressorParams;
use simpitch_ml::service::PredictionService;
use simpitch_ml::simulation::{CancellationToken, RunOutcome, SimulationStatus};
use simpitch_ml::store::{ResultStore, SqliteStore, SyncStore};
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

const TEAMS: [&str; 4] = ["A", "B", "C", "D"];

fn fixture(round_no: i64, home: &str, away: &str, score: Option<(u32, u32)>) -> MatchRound {
    MatchRound {
        id: format!("m{round_no}-{home}{away}"),
        round_id: format!("r{round_no}"),
        home_team_id: home.to_string(),
        away_team_id: away.to_string(),
        home_goals: score.map(|s| s.0),
        away_goals: score.map(|s| s.1),
        is_draw: score.is_some_and(|s| s.0 == s.1),
        is_played: score.is_some(),
    }
}

fn round_fixtures(round_no: i64, played: bool) -> Vec<MatchRound> {
    let score = |h: u32, a: u32| played.then_some((h, a));
    if round_no % 2 == 0 {
        vec![
            fixture(round_no, "A", "B", score((round_no % 3) as u32, 1)),
            fixture(round_no, "C", "D", score(2, (round_no % 2) as u32)),
        ]
    } else {
        vec![
            fixture(round_no, "A", "C", score(1, (round_no % 4) as u32)),
            fixture(round_no, "B", "D", score(0, 2)),
        ]
    }
}

fn snapshot(team: &str, round_no: i64, played: u32, gf: u32) -> StrengthSnapshot {
    StrengthSnapshot {
        team_id: team.to_string(),
        round_id: format!("r{round_no}"),
        likelihood: StrengthItem::new(f64::from(gf) / f64::from(played.max(1)), 1.0),
        posterior: StrengthItem::new(1.4 + f64::from(gf) * 0.05, 1.3),
        expected_goals: 1.4,
        last_update: parse_timestamp("2024-03-01T00:00:00").expect("valid timestamp"),
        season_stats: SeasonStats {
            team_id: team.to_string(),
            league_id: "L".to_string(),
            league_strength: Some(1.5),
            matches_played: played,
            goals_for: gf,
            goals_against: played,
            ..SeasonStats::default()
        },
    }
}

fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("in-memory sqlite");
    let rounds = (1..=6)
        .map(|no| LeagueRound {
            id: format!("r{no}"),
            league_id: "L".to_string(),
            season_year: "2024".to_string(),
            round: no,
        })
        .collect::<Vec<_>>();
    store.upsert_league_rounds(&rounds).expect("rounds");
    for no in 1..=6 {
        store
            .upsert_match_rounds(&round_fixtures(no, no <= 4))
            .expect("matches");
    }

    let historical = IterationResult {
        id: "hist-iter-0".to_string(),
        simulation_id: "hist-1".to_string(),
        iteration_index: 0,
        start_date: Utc::now(),
        execution_time: Duration::from_millis(3),
        team_strengths: (1..=4)
            .flat_map(|no| TEAMS.map(|team| snapshot(team, no, no as u32, no as u32 + 1)))
            .collect(),
        simulated_match_rounds: (5..=6)
            .flat_map(|no| round_fixtures(no, true))
            .collect(),
    };
    store
        .save_iteration_result("L", &historical)
        .expect("historical result");
    Arc::new(store)
}

fn service(store: &Arc<SqliteStore>) -> Arc<PredictionService> {
    let trainer = ModelTrainer::new(
        Arc::new(MemoryStore::default()),
        RegressorParams {
            epochs: 15,
            ..RegressorParams::default()
        },
    );
    Arc::new(PredictionService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        trainer,
    ))
}

fn request(simulation_id: &str, iterations: usize) -> PredictRequest {
    PredictRequest {
        simulation_id: simulation_id.to_string(),
        league_id: "L".to_string(),
        iteration_count: iterations,
        team_strengths: TEAMS.map(|team| snapshot(team, 4, 4, 5)).to_vec(),
        matches_to_simulate: vec![
            fixture(6, "C", "D", None),
            fixture(5, "A", "C", None),
            fixture(5, "B", "D", None),
            fixture(6, "A", "B", None),
        ],
        train_until_round_no: None,
        train_ratio: None,
        league_avg_strength: 1.5,
        seed: Some(9),
        games_to_reach_trust: 25,
    }
}

#[tokio::test]
async fn spawned_run_streams_and_persists_results() {
    let store = seeded_store();
    let service = service(&store);

    let mut handle = service.spawn(request("sim-new", 3));
    assert_eq!(handle.simulation_id(), "sim-new");
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let outcome = handle.outcome().await.expect("run succeeds");

    assert_eq!(outcome, RunOutcome::Completed { iterations: 3 });
    assert_eq!(events.len(), 4);
    assert!(events[..3].iter().all(|e| e.status == SimulationStatus::Running));
    assert_eq!(events[3].status, SimulationStatus::Completed);

    let first = events[0].result.as_ref().expect("iteration result");
    let rounds = first
        .simulated_match_rounds
        .iter()
        .map(|m| m.round_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(rounds, vec!["r5", "r5", "r6", "r6"]);
    assert!(first.simulated_match_rounds.iter().all(|m| m.is_played));
    assert!(first
        .simulated_match_rounds
        .iter()
        .all(|m| m.home_goals.is_some_and(|g| g <= 15)));

    let stored = store.iteration_results("sim-new").expect("stored results");
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].team_strengths.len(), first.team_strengths.len());

    let sync = store
        .last_sync("L")
        .expect("sync")
        .expect("sync recorded");
    assert_eq!(sync.added_simulations, 1);
    let pending = store
        .simulations_since("L", Some(sync.last_sync_date))
        .expect("pending");
    assert_eq!(pending, vec!["sim-new".to_string()]);
}

#[test]
fn blocking_handle_reports_completion() {
    let store = seeded_store();
    let service = service(&store);

    let mut handle = service.spawn(request("sim-blocking", 2));
    let mut counters = Vec::new();
    while let Some(event) = handle.blocking_next_event() {
        counters.push((event.status, event.counter));
    }
    let outcome = handle.blocking_outcome().expect("run succeeds");
    assert_eq!(outcome.iterations(), 2);
    assert_eq!(
        counters,
        vec![
            (SimulationStatus::Running, 1),
            (SimulationStatus::Running, 2),
            (SimulationStatus::Completed, 2),
        ]
    );
}

#[test]
fn invalid_trust_fails_before_any_work() {
    let store = seeded_store();
    let service = service(&store);
    let mut bad = request("sim-bad", 2);
    bad.games_to_reach_trust = 0;

    let mut emitted = 0usize;
    let result = service.run_blocking(&bad, &CancellationToken::new(), |_| {
        emitted += 1;
        Ok(())
    });
    assert!(matches!(result, Err(EngineError::InvalidTrust(0))));
    assert_eq!(emitted, 0);
    assert!(store.last_sync("L").expect("sync").is_none());
}

#[test]
fn empty_history_without_models_is_an_error() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory sqlite"));
    let service = service(&store);

    let result = service.run_blocking(&request("sim-empty", 1), &CancellationToken::new(), |_| Ok(()));
    assert!(matches!(result, Err(EngineError::NoTrainingData(_))));
}

#[test]
fn cancelling_after_first_event_suppresses_completion() {
    let store = seeded_store();
    let service = service(&store);
    let cancel = CancellationToken::new();

    let mut statuses = Vec::new();
    let outcome = service
        .run_blocking(&request("sim-cancel", 4), &cancel, |event| {
            statuses.push(event.status);
            cancel.cancel();
            Ok(())
        })
        .expect("run");
    assert_eq!(outcome, RunOutcome::Cancelled { iterations: 1 });
    assert_eq!(statuses, vec![SimulationStatus::Running]);
    assert_eq!(
        store.iteration_results("sim-cancel").expect("stored").len(),
        1
    );
}
