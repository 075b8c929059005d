//! Historical behavior analysis.
//!
//! Counts typed events in trailing windows and derives the ratio-of-change
//! metric that feeds the behavior part of the feature vector.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use matrix_store::{HistoryStore, HISTORY_TIME_FORMAT};
use tracing::instrument;

use crate::domain::{EventSet, EventType, Result};
use crate::normalize::round2;

fn history_ts(ts: DateTime<Utc>) -> String {
    ts.format(HISTORY_TIME_FORMAT).to_string()
}

/// Count events of each type in the set with `start <= created_at < end`.
///
/// An empty `user` aggregates over every actor. Every type in the set is
/// present in the result, zero when unseen; types outside the set are
/// ignored.
#[instrument(skip(store))]
pub async fn count_events_in_window(
    store: &dyn HistoryStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    user: &str,
    event_set: EventSet,
) -> Result<BTreeMap<EventType, u64>> {
    let mut counts: BTreeMap<EventType, u64> =
        event_set.types().iter().map(|t| (*t, 0)).collect();

    let actor = (!user.is_empty()).then_some(user);
    let rows = store
        .event_types_in_range(&history_ts(start), &history_ts(end), actor)
        .await?;

    for name in rows {
        if let Some(t) = event_set.classify(&name) {
            *counts.entry(t).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Raw counts for the window `[reference - window, reference)`.
pub async fn recent_activity_counts(
    store: &dyn HistoryStore,
    reference: DateTime<Utc>,
    window: Duration,
    user: &str,
    event_set: EventSet,
) -> Result<BTreeMap<EventType, u64>> {
    count_events_in_window(store, reference - window, reference, user, event_set).await
}

/// Ratio of change between the last window and the one before it.
///
/// Per type: `round2(last / prev - 1)` when the earlier window saw any
/// event of that type, exactly `0.0` otherwise.
pub async fn past_behavior_delta(
    store: &dyn HistoryStore,
    reference: DateTime<Utc>,
    window: Duration,
    user: &str,
    event_set: EventSet,
) -> Result<BTreeMap<EventType, f64>> {
    let last = count_events_in_window(store, reference - window, reference, user, event_set).await?;
    let prev = count_events_in_window(
        store,
        reference - window - window,
        reference - window,
        user,
        event_set,
    )
    .await?;

    Ok(event_set
        .types()
        .iter()
        .map(|t| {
            let l = last.get(t).copied().unwrap_or(0);
            let p = prev.get(t).copied().unwrap_or(0);
            (*t, delta(l, p))
        })
        .collect())
}

fn delta(last: u64, prev: u64) -> f64 {
    if prev == 0 {
        return 0.0;
    }
    round2(last as f64 / prev as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use matrix_store::fakes::MemoryHistoryStore;
    use matrix_store::EventRow;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 15, 0, 0, 0).unwrap()
    }

    fn days_before(days: i64) -> String {
        history_ts(reference() - Duration::days(days))
    }

    fn seeded() -> MemoryHistoryStore {
        let store = MemoryHistoryStore::new();
        // last window: 3 pushes, 1 watch
        for d in [1, 2, 3] {
            store.insert_event(EventRow::new("PushEvent", "alice", "r1", days_before(d)));
        }
        store.insert_event(EventRow::new("WatchEvent", "alice", "r1", days_before(5)));
        // previous window: 2 pushes, no watches, 1 fork
        for d in [15, 20] {
            store.insert_event(EventRow::new("PushEvent", "alice", "r1", days_before(d)));
        }
        store.insert_event(EventRow::new("ForkEvent", "alice", "r2", days_before(16)));
        // someone else, and a type outside the core set
        store.insert_event(EventRow::new("PushEvent", "bob", "r1", days_before(1)));
        store.insert_event(EventRow::new("IssueCommentEvent", "alice", "r1", days_before(1)));
        store.insert_event(EventRow::new("GollumEvent", "alice", "r1", days_before(1)));
        store
    }

    #[tokio::test]
    async fn test_counts_every_type_in_set() {
        let store = seeded();
        let counts = recent_activity_counts(
            &store,
            reference(),
            Duration::days(14),
            "alice",
            EventSet::Core,
        )
        .await
        .unwrap();

        assert_eq!(counts.len(), 7);
        assert_eq!(counts[&EventType::PushEvent], 3);
        assert_eq!(counts[&EventType::WatchEvent], 1);
        assert_eq!(counts[&EventType::ForkEvent], 0);
        assert!(!counts.contains_key(&EventType::IssueCommentEvent));
    }

    #[tokio::test]
    async fn test_extended_set_counts_comments() {
        let store = seeded();
        let counts = recent_activity_counts(
            &store,
            reference(),
            Duration::days(14),
            "alice",
            EventSet::Extended,
        )
        .await
        .unwrap();

        assert_eq!(counts.len(), 10);
        assert_eq!(counts[&EventType::IssueCommentEvent], 1);
    }

    #[tokio::test]
    async fn test_empty_user_aggregates_all_actors() {
        let store = seeded();
        let counts = recent_activity_counts(
            &store,
            reference(),
            Duration::days(14),
            "",
            EventSet::Core,
        )
        .await
        .unwrap();
        assert_eq!(counts[&EventType::PushEvent], 4);
    }

    #[tokio::test]
    async fn test_window_end_is_exclusive() {
        let store = MemoryHistoryStore::new();
        store.insert_event(EventRow::new("PushEvent", "alice", "r1", history_ts(reference())));

        let counts = count_events_in_window(
            &store,
            reference() - Duration::days(1),
            reference(),
            "alice",
            EventSet::Core,
        )
        .await
        .unwrap();
        assert_eq!(counts[&EventType::PushEvent], 0);
    }

    #[tokio::test]
    async fn test_past_behavior_delta() {
        let store = seeded();
        let deltas = past_behavior_delta(
            &store,
            reference(),
            Duration::days(14),
            "alice",
            EventSet::Core,
        )
        .await
        .unwrap();

        // 3 / 2 - 1
        assert_eq!(deltas[&EventType::PushEvent], 0.5);
        // no watches in the earlier window
        assert_eq!(deltas[&EventType::WatchEvent], 0.0);
        // 0 / 1 - 1
        assert_eq!(deltas[&EventType::ForkEvent], -1.0);
        assert_eq!(deltas[&EventType::CreateEvent], 0.0);
    }

    #[test]
    fn test_delta_rounds_to_two_places() {
        assert_eq!(delta(1, 3), -0.67);
        assert_eq!(delta(5, 0), 0.0);
        assert_eq!(delta(0, 0), 0.0);
    }

    #[test]
    fn test_delta_exact_ties_round_to_even() {
        // 9/8 - 1 and 3/8 - 1 are exact binary ties
        assert_eq!(delta(9, 8), 0.12);
        assert_eq!(delta(3, 8), -0.62);
        assert_eq!(delta(13, 8), 0.62);
    }
}
