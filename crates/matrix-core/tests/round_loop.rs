//! Driver loop against an in-memory controller.

mod common;

use std::sync::Arc;

use common::*;
use matrix_core::{
    EventSet, EventType, FixedScoreOracle, MatrixError, OracleHandle, SessionClient,
    SimulationConfig, SimulationDriver,
};
use matrix_store::HistoryStore;

fn push_oracle() -> OracleHandle {
    OracleHandle::new(
        Box::new(FixedScoreOracle::always(EventType::PushEvent, EventSet::Core)),
        EventSet::Core,
    )
}

#[tokio::test]
async fn terminal_round_ends_without_registering() {
    let (stream, controller) = controller(vec![terminal()]);
    let store: Arc<dyn HistoryStore> = small_corpus();

    let driver = SimulationDriver::new(
        "worker-0",
        store,
        vec!["agentA".to_string()],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(1).with_seed(1),
    )
    .unwrap();

    let report = driver.run().await.unwrap();
    assert_eq!(report.rounds, 0);
    assert_eq!(report.events, 0);

    let seen = controller.await.unwrap();
    assert_eq!(methods(&seen), vec!["can_we_start_yet"]);
}

#[tokio::test]
async fn driver_runs_on_a_spawned_worker_task() {
    let (stream, controller) = controller(vec![round(0), serde_json::Value::Null, terminal()]);
    let store: Arc<dyn HistoryStore> = small_corpus();

    let driver = SimulationDriver::new(
        "worker-3",
        store,
        vec!["agentA".to_string()],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(1).with_seed(3),
    )
    .unwrap();

    let report = tokio::spawn(driver.run()).await.unwrap().unwrap();
    assert_eq!(report.worker, "worker-3");
    assert_eq!(report.rounds, 1);
    assert_eq!(report.events, 1);

    let seen = controller.await.unwrap();
    assert_eq!(
        methods(&seen),
        vec!["can_we_start_yet", "register_events", "can_we_start_yet"]
    );
}

#[tokio::test]
async fn each_round_registers_one_event_per_agent_in_order() {
    let store = small_corpus();
    store.insert_user(matrix_store::UserProfile::new("agentB", 0, 0, 0));
    let store: Arc<dyn HistoryStore> = store;

    let (stream, controller) = controller(vec![
        round(0),
        serde_json::Value::Null,
        round(1),
        serde_json::Value::Null,
        terminal(),
    ]);

    let driver = SimulationDriver::new(
        "worker-0",
        store,
        vec!["agentB".to_string(), "agentA".to_string()],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(1).with_seed(7),
    )
    .unwrap();

    let report = driver.run().await.unwrap();
    assert_eq!(report.rounds, 2);
    assert_eq!(report.events, 4);

    let seen = controller.await.unwrap();
    assert_eq!(
        methods(&seen),
        vec![
            "can_we_start_yet",
            "register_events",
            "can_we_start_yet",
            "register_events",
            "can_we_start_yet"
        ]
    );

    for (i, request) in [(0, &seen[1]), (1, &seen[3])] {
        let events = request["params"]["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["actor"]["login_h"], "agentB");
        assert_eq!(events[1]["actor"]["login_h"], "agentA");
        assert_eq!(events[0]["id_h"], format!("agentB_{i}"));
        assert_eq!(events[0]["_l_created_at"], i);
        // one timestamp per round
        assert_eq!(events[0]["created_at"], events[1]["created_at"]);
        assert_eq!(events[0]["type"], "PushEvent");
    }
}

#[tokio::test]
async fn missing_agent_aborts_before_registering() {
    let store: Arc<dyn HistoryStore> = small_corpus();
    let (stream, controller) = controller(vec![round(0), serde_json::Value::Null]);

    let driver = SimulationDriver::new(
        "worker-0",
        store,
        vec!["agentA".to_string(), "ghost".to_string()],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(1),
    )
    .unwrap();

    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, MatrixError::AgentNotFound { ref agent } if agent == "ghost"));

    let seen = controller.await.unwrap();
    assert_eq!(methods(&seen), vec!["can_we_start_yet"]);
}

#[tokio::test]
async fn empty_corpus_fails_preflight() {
    let store: Arc<dyn HistoryStore> = Arc::new(matrix_store::fakes::MemoryHistoryStore::new());
    let (stream, controller) = controller(vec![round(0)]);

    let driver = SimulationDriver::new(
        "worker-0",
        store,
        vec!["agentA".to_string()],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(10),
    )
    .unwrap();

    assert!(matches!(
        driver.run().await.unwrap_err(),
        MatrixError::EmptyCorpus
    ));
    assert!(controller.await.unwrap().is_empty());
}

#[test]
fn oracle_and_run_must_agree_on_event_set() {
    let (stream, _server) = tokio::io::duplex(64);
    let store: Arc<dyn HistoryStore> = Arc::new(matrix_store::fakes::MemoryHistoryStore::new());

    let err = SimulationDriver::new(
        "worker-0",
        store,
        vec![],
        push_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(10).with_event_set(EventSet::Extended),
    )
    .unwrap_err();
    assert!(matches!(err, MatrixError::Config(_)));
}
