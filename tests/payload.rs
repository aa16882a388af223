use serde_json::json;

use simpitch_ml::EngineError;
use simpitch_ml::domain::{NIL_ROUND_ID, default_last_update};
use simpitch_ml::payload::{
    parse_league_rounds_str, parse_matches, parse_predict_request, parse_snapshots,
    parse_snapshots_str, parse_timestamp,
};

const EPS: f64 = 1e-9;

#[test]
fn pascal_case_snapshot_with_tuple_items() {
    let payload = json!([{
        "TeamId": "team-a",
        "RoundId": "round-3",
        "Likelihood": { "Item1": 2.0, "Item2": 0.5 },
        "Posterior": { "Offensive": 1.9, "Defensive": 0.8 },
        "ExpectedGoals": 1.9,
        "LastUpdate": "2024-05-01T12:30:00.5",
        "SeasonStats": {
            "MatchesPlayed": 4,
            "GoalsFor": 8,
            "GoalsAgainst": 2,
            "LeagueStrength": 1.6,
            "SeasonYear": 2024,
            "Wins": 3
        }
    }]);
    let snapshots = parse_snapshots(&payload);
    assert_eq!(snapshots.len(), 1);
    let snap = &snapshots[0];
    assert_eq!(snap.team_id, "team-a");
    assert_eq!(snap.round_id, "round-3");
    assert!((snap.likelihood.offensive - 2.0).abs() < EPS);
    assert!((snap.likelihood.defensive - 0.5).abs() < EPS);
    assert!((snap.posterior.defensive - 0.8).abs() < EPS);
    assert_eq!(snap.season_stats.matches_played, 4);
    assert_eq!(snap.season_stats.wins, 3);
    assert_eq!(snap.season_stats.season_year, "2024");
    assert_eq!(snap.season_stats.team_id, "team-a");
    assert_eq!(
        snap.last_update,
        parse_timestamp("2024-05-01 12:30:00.500").expect("valid timestamp")
    );
}

#[test]
fn missing_fields_take_documented_defaults() {
    let snapshots = parse_snapshots(&json!([{ "team_id": "t" }]));
    assert_eq!(snapshots.len(), 1);
    let snap = &snapshots[0];
    assert_eq!(snap.round_id, NIL_ROUND_ID);
    assert!((snap.likelihood.offensive - 1.0).abs() < EPS);
    assert!((snap.posterior.defensive - 1.0).abs() < EPS);
    assert!(snap.expected_goals.abs() < EPS);
    assert_eq!(snap.last_update, default_last_update());
    assert_eq!(snap.season_stats.matches_played, 0);
}

#[test]
fn malformed_entries_are_dropped() {
    let payload = json!([
        { "teamId": "ok", "roundId": "r1" },
        { "RoundId": "r1" },
        { "team_id": "bad", "season_stats": { "matches_played": "lots" } },
        42,
        { "team_id": "late", "last_update": "not a date" }
    ]);
    let snapshots = parse_snapshots(&payload);
    let teams = snapshots.iter().map(|s| s.team_id.as_str()).collect::<Vec<_>>();
    assert_eq!(teams, vec!["ok", "late"]);
    assert_eq!(snapshots[1].last_update, default_last_update());
}

#[test]
fn grouped_and_stringified_payloads_are_flattened() {
    let grouped = json!({
        "team-a": [{ "TeamId": "team-a", "RoundId": "r1" }, { "TeamId": "team-a", "RoundId": "r2" }],
        "team-b": { "TeamId": "team-b", "RoundId": "r1" }
    });
    assert_eq!(parse_snapshots(&grouped).len(), 3);

    let stringified = json!("[{\"team_id\": \"x\", \"round_id\": \"r9\"}]");
    let snapshots = parse_snapshots(&stringified);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].round_id, "r9");

    assert!(parse_snapshots_str("{ not json").is_empty());
}

#[test]
fn matches_parse_with_aliases_and_infer_played() {
    let matches = parse_matches(&json!([
        { "Id": "m1", "RoundId": "r1", "HomeTeamId": "a", "AwayTeamId": "b", "HomeGoals": 1, "AwayGoals": 1 },
        { "id": "m2", "roundId": "r2", "homeTeamId": "b", "awayTeamId": "a" },
        { "id": "m3", "home_team_id": "a" }
    ]));
    assert_eq!(matches.len(), 2);
    assert!(matches[0].is_played);
    assert!(matches[0].is_draw);
    assert_eq!(matches[0].score(), Some((1, 1)));
    assert!(!matches[1].is_played);
    assert_eq!(matches[1].score(), None);
}

#[test]
fn league_rounds_accept_pascal_case() {
    let rounds = parse_league_rounds_str(
        r#"[{"Id": "r1", "LeagueId": "L", "SeasonYear": 2024, "Round": 1},
            {"id": "r2", "league_id": "L", "season_year": "2024", "round": 2},
            {"id": "broken"}]"#,
    )
    .expect("valid json");
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].season_year, "2024");
    assert_eq!(rounds[1].round, 2);
}

#[test]
fn request_requires_trust_and_average() {
    let raw = json!({
        "simulation_id": "s1",
        "league_id": "L",
        "iteration_count": 2,
        "league_avg_strength": 1.7
    })
    .to_string();
    assert!(matches!(parse_predict_request(&raw), Err(EngineError::Json(_))));

    let raw = json!({
        "SimulationId": "s1",
        "LeagueId": "L",
        "IterationCount": 2,
        "LeagueAvgStrength": 1.7,
        "GamesToReachTrust": 25,
        "TrainUntilRoundNo": 0,
        "TeamStrengths": [{ "TeamId": "a", "RoundId": "r1" }],
        "MatchesToSimulate": [{ "Id": "m", "RoundId": "r2", "HomeTeamId": "a", "AwayTeamId": "b" }]
    })
    .to_string();
    let request = parse_predict_request(&raw).expect("valid request");
    assert_eq!(request.games_to_reach_trust, 25);
    assert_eq!(request.train_until_round_no, None);
    assert!((request.effective_train_ratio() - 0.8).abs() < EPS);
    assert_eq!(request.team_strengths.len(), 1);
    assert_eq!(request.matches_to_simulate.len(), 1);
}

#[test]
fn request_rejects_non_positive_trust() {
    let raw = json!({
        "simulation_id": "s1",
        "league_id": "L",
        "iteration_count": 1,
        "league_avg_strength": 1.7,
        "games_to_reach_trust": 0
    })
    .to_string();
    assert!(matches!(
        parse_predict_request(&raw),
        Err(EngineError::InvalidTrust(0))
    ));
}

#[test]
fn offset_timestamps_normalize_to_utc() {
    assert_eq!(
        parse_timestamp("2024-01-01T02:00:00+02:00"),
        parse_timestamp("2024-01-01T00:00:00")
    );
    assert_eq!(parse_timestamp("   "), None);
}
