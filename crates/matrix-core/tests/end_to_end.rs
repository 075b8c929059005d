//! Full pipeline: store -> features -> oracle -> controller.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::*;
use matrix_core::{
    compute_merge_fractions, epoch_to_utc, Calibration, EventSet, FeatureAssembler,
    FeatureVector, FixedScoreOracle, MergeFractions, OracleHandle, RepoSampler, SessionClient,
    SimulationConfig, SimulationDriver, WIRE_TIME_FORMAT,
};
use matrix_store::{
    HistoryStore, PullRequestRow, RepoProfile, SurrealHistoryStore, UserProfile,
};

fn stub_oracle() -> OracleHandle {
    OracleHandle::new(
        Box::new(FixedScoreOracle::new(vec![5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0])),
        EventSet::Core,
    )
}

#[tokio::test]
async fn single_agent_single_round_emits_create_event() {
    let store: Arc<dyn HistoryStore> = small_corpus();
    let (stream, controller) = controller(vec![round(0), serde_json::Value::Null, terminal()]);

    let driver = SimulationDriver::new(
        "worker-0",
        store,
        vec!["agentA".to_string()],
        stub_oracle(),
        SessionClient::new(stream),
        SimulationConfig::new(1).with_seed(3),
    )
    .unwrap();
    let report = driver.run().await.unwrap();
    assert_eq!(report.events, 1);

    let seen = controller.await.unwrap();
    let events = seen[1]["params"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event["id_h"], "agentA_0");
    assert_eq!(event["actor"]["login_h"], "agentA");
    assert_eq!(event["repo"]["full_name_h"], "repoR");
    assert_eq!(event["type"], "CreateEvent");
    assert_eq!(event["_l_created_at"], 0);

    let created_at = event["created_at"].as_str().unwrap();
    let ts = chrono::NaiveDateTime::parse_from_str(created_at, WIRE_TIME_FORMAT)
        .unwrap()
        .and_utc()
        .timestamp();
    assert!((ROUND_START..ROUND_END).contains(&ts));
}

fn round_ts() -> DateTime<Utc> {
    epoch_to_utc(ROUND_START).unwrap()
}

#[tokio::test]
async fn feature_vector_matches_documented_transform() {
    let store = small_corpus();
    let assembler = FeatureAssembler::new(
        Calibration::default(),
        EventSet::Core,
        RepoSampler::new(1, 10),
    );
    let agent = UserProfile::new("agentA", 10, 5, 2);
    let repo = RepoProfile::new(1, "repoR", 100, 3, 1, Some(1));

    let features = assembler
        .features_for(store.as_ref(), &agent, &repo, round_ts(), &MergeFractions::default())
        .await
        .unwrap();
    let v = features.vector.as_slice();
    assert_eq!(v.len(), FeatureVector::expected_len(EventSet::Core));

    let close = |a: f64, b: f64| (a - b).abs() < 1e-12;
    assert!(close(v[0], 10f64.ln() / 132125f64.ln()));
    assert!(close(v[1], 5f64.ln() / 134452f64.ln()));
    assert!(close(v[2], 2f64.ln() / 52722f64.ln()));
    assert!(close(v[3], 100f64.ln() / 291574f64.ln()));
    assert!(close(v[4], 3f64.ln() / 107293f64.ln()));
    assert_eq!(v[5], 0.0);
    assert_eq!(v[6], 0.0);
    // no history: every delta is 0, which normalizes to ln 2 / ln(max + 2)
    assert!(close(v[7], 2f64.ln() / 32971f64.ln()));
    assert!(close(v[13], 2f64.ln() / 1400f64.ln()));
    assert_eq!(&v[14..], &[0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn reputation_features_from_surreal_store() {
    let store = SurrealHistoryStore::in_memory().await.unwrap();
    store
        .insert_user(UserProfile::new("agentA", 10, 5, 2))
        .await
        .unwrap();
    store
        .insert_repo(RepoProfile::new(1, "repoR", 100, 3, 1, None))
        .await
        .unwrap();

    // agentA: 2 prompt merges, 1 rejection, 1 slow merge -> 2 / 4
    for merged_at in ["2017-01-02T00:00:00Z", "2017-01-03T00:00:00Z"] {
        store
            .insert_pull_request(PullRequestRow::closed(
                "agentA",
                "repoR",
                true,
                "2017-01-01T00:00:00Z",
                Some(merged_at.to_string()),
            ))
            .await
            .unwrap();
    }
    store
        .insert_pull_request(PullRequestRow::closed(
            "agentA",
            "repoR",
            false,
            "2017-01-01T00:00:00Z",
            None,
        ))
        .await
        .unwrap();
    store
        .insert_pull_request(PullRequestRow::closed(
            "agentA",
            "repoR",
            true,
            "2017-01-01T00:00:00Z",
            Some("2017-05-01T00:00:00Z".to_string()),
        ))
        .await
        .unwrap();
    // a submitter with nothing closed drags repo quality down
    store
        .insert_pull_request(PullRequestRow::open("newcomer", "repoR", "2017-02-01T00:00:00Z"))
        .await
        .unwrap();

    let calibration = Calibration::default();
    let merge = compute_merge_fractions(&store, calibration.merge_period())
        .await
        .unwrap();
    assert_eq!(merge.user("agentA"), 0.5);
    assert_eq!(merge.repo("repoR"), 0.5);
    assert!(!merge.by_user.contains_key("newcomer"));

    let assembler = FeatureAssembler::new(calibration, EventSet::Core, RepoSampler::new(1, 10));
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(11);
    let features = assembler
        .build_features(&store, "agentA", round_ts(), &merge, &mut rng)
        .await
        .unwrap();

    let v = features.vector.as_slice();
    assert_eq!(features.repo_id, "repoR");
    assert_eq!(v[14], 0.5);
    assert_eq!(v[15], 0.5);
    // (0.5 + 0.0) / 2
    assert_eq!(v[16], 0.25);
}
