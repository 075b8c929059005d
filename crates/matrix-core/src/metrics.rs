//! Process-wide counters for agent runs.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`] when a worker finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters shared by every worker in the process.
pub struct Metrics {
    rounds_completed: AtomicU64,
    events_emitted: AtomicU64,
    repo_resamples: AtomicU64,
    rows_skipped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            rounds_completed: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            repo_resamples: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
        }
    }

    pub fn inc_rounds(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_completed", "counter incremented");
    }

    pub fn add_events(&self, n: u64) {
        self.events_emitted.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "events_emitted", n, "counter incremented");
    }

    /// A sampled ordinal referenced no repository.
    pub fn inc_resamples(&self) {
        self.repo_resamples.fetch_add(1, Ordering::Relaxed);
    }

    /// A malformed history row was skipped during a scan.
    pub fn inc_rows_skipped(&self) {
        self.rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counter values as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            rounds_completed = self.rounds_completed(),
            events_emitted = self.events_emitted(),
            repo_resamples = self.repo_resamples(),
            rows_skipped = self.rows_skipped(),
        );
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn repo_resamples(&self) -> u64 {
        self.repo_resamples.load(Ordering::Relaxed)
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.rounds_completed.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
        self.repo_resamples.store(0, Ordering::Relaxed);
        self.rows_skipped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_rounds();
        m.inc_rounds();
        assert_eq!(m.rounds_completed(), 2);

        m.add_events(7);
        m.add_events(3);
        assert_eq!(m.events_emitted(), 10);

        m.inc_resamples();
        m.inc_rows_skipped();
        m.inc_rows_skipped();
        assert_eq!(m.repo_resamples(), 1);
        assert_eq!(m.rows_skipped(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_rounds();
        m.add_events(4);
        m.inc_resamples();
        m.inc_rows_skipped();
        m.reset();
        assert_eq!(m.rounds_completed(), 0);
        assert_eq!(m.events_emitted(), 0);
        assert_eq!(m.repo_resamples(), 0);
        assert_eq!(m.rows_skipped(), 0);
    }
}
