//! Structured lifecycle events for agent workers.
//!
//! - `round_span`: span tagging everything inside a round with the worker
//!   and round number
//! - `emit_*`: one function per lifecycle event, logged with an `event` field
//!
//! Set `RUST_LOG=matrix_core=debug` to see per-agent decisions.

use tracing::{debug, info, warn};

/// Round-scoped span, attached to the round future with
/// `tracing::Instrument` so it stays valid across awaits.
///
/// ```ignore
/// driver.play_round(&round).instrument(round_span("worker-0", 12)).await
/// ```
pub fn round_span(worker: &str, round: i64) -> tracing::Span {
    tracing::info_span!("matrix.round", worker = %worker, round = round)
}

pub fn emit_simulation_started(worker: &str, agents: usize, num_repos: u64) {
    info!(
        event = "simulation.started",
        worker = %worker,
        agents = agents,
        num_repos = num_repos,
    );
}

pub fn emit_round_started(round: i64, start_time: i64, end_time: i64) {
    info!(
        event = "round.started",
        round = round,
        start_time = start_time,
        end_time = end_time,
    );
}

pub fn emit_round_finished(round: i64, events: usize, duration_ms: u64) {
    info!(
        event = "round.finished",
        round = round,
        events = events,
        duration_ms = duration_ms,
    );
}

/// Per-agent decision, with the raw oracle scores.
pub fn emit_agent_decided(agent: &str, repo: &str, event_type: &str, scores: &[f64]) {
    debug!(
        event = "agent.decided",
        agent = %agent,
        repo = %repo,
        event_type = %event_type,
        scores = ?scores,
    );
}

pub fn emit_simulation_finished(worker: &str, rounds: u64, events: u64, elapsed_ms: u64) {
    info!(
        event = "simulation.finished",
        worker = %worker,
        rounds = rounds,
        events = events,
        elapsed_ms = elapsed_ms,
    );
}

/// A history row could not be used and was skipped.
pub fn emit_row_skipped(table: &str, reason: &dyn std::fmt::Display) {
    debug!(event = "row.skipped", table = %table, reason = %reason);
}

/// Worker aborted with a fatal error.
pub fn emit_simulation_failed(worker: &str, error: &dyn std::fmt::Display) {
    warn!(event = "simulation.failed", worker = %worker, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_span_create() {
        let _entered = round_span("worker-0", 3).entered();
    }
}
