//! Matrix Core Library
//!
//! Agent-side decision pipeline for the Matrix simulation: feature
//! reconstruction from the historical store, the decision oracle, and the
//! controller session that paces rounds.

pub mod behavior;
pub mod config;
pub mod domain;
pub mod driver;
pub mod features;
pub mod metrics;
pub mod normalize;
pub mod obs;
pub mod oracle;
pub mod reputation;
pub mod rpc;
pub mod telemetry;

pub use behavior::{count_events_in_window, past_behavior_delta, recent_activity_counts};

pub use config::{Calibration, ConfigError, SimulationConfig};

pub use domain::{
    epoch_to_utc, EventRecord, EventSet, EventType, MatrixError, Result, RoundInfo,
    ValidationError, TERMINAL_ROUND, WIRE_TIME_FORMAT,
};

pub use driver::{load_agent_ids, RoundOutcome, SimulationDriver, SimulationReport};

pub use features::{preflight, AgentFeatures, FeatureAssembler, FeatureVector, RepoSampler};

pub use normalize::{normalize_count, normalize_delta, round2, Bounds};

pub use obs::{
    emit_agent_decided, emit_round_finished, emit_round_started, emit_row_skipped,
    emit_simulation_failed, emit_simulation_finished, emit_simulation_started, round_span,
};

pub use oracle::{
    CommandOracle, Decision, DecisionOracle, FeedForwardOracle, FeedForwardWeights,
    FixedScoreOracle, OracleError, OracleHandle,
};

pub use reputation::{
    compute_merge_fractions, issue_comment_fractions, repo_quality, MergeFractions,
};

pub use rpc::{connect, RpcError, SessionClient, SessionState};

pub use telemetry::init_tracing;

/// Crate version, reported by the agent binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
