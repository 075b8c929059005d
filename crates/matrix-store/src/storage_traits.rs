//! Storage trait definitions for the historical store
//!
//! `HistoryStore` is the read-only query surface the agents consume. All
//! methods are async and backend-agnostic. Scans return a [`RowCursor`]
//! rather than a collection so callers fold rows as they go.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::{IssueRow, PullRequestRow, RepoProfile, UserProfile};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// RowCursor - consume-once query results
// ---------------------------------------------------------------------------

/// Finite, non-restartable sequence of rows produced by one query.
///
/// Deliberately neither `Clone` nor rewindable: each query is consumed
/// exactly once.
pub struct RowCursor<T> {
    rows: Box<dyn Iterator<Item = T> + Send>,
}

impl<T> RowCursor<T> {
    /// Wrap any sendable iterator.
    pub fn new<I>(rows: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        Self {
            rows: Box::new(rows),
        }
    }

    /// Cursor over an already materialized result set.
    pub fn from_vec(rows: Vec<T>) -> Self
    where
        T: Send + 'static,
    {
        Self::new(rows.into_iter())
    }

    /// Cursor that yields nothing.
    pub fn empty() -> Self
    where
        T: Send + 'static,
    {
        Self::new(std::iter::empty())
    }
}

impl<T> Iterator for RowCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rows.next()
    }
}

impl<T> std::fmt::Debug for RowCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// HistoryStore - read side of the historical corpus
// ---------------------------------------------------------------------------

/// Read-only query surface over the historical corpus.
///
/// Guarantees:
/// - Range queries are half-open: `start <= created_at < end`.
/// - Timestamps are compared as strings in `HISTORY_TIME_FORMAT`.
/// - Missing rows are `Ok(None)`, never an error.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Profile of a user by anonymized login.
    async fn user_profile(&self, login_h: &str) -> StorageResult<Option<UserProfile>>;

    /// Repository at a 1-based ordinal position. Ordinals may have gaps.
    async fn repo_by_ordinal(&self, ordinal: u64) -> StorageResult<Option<RepoProfile>>;

    /// Number of repositories in the corpus.
    async fn repo_count(&self) -> StorageResult<u64>;

    /// Event type names of all events in `[start, end)`, optionally
    /// restricted to one actor.
    async fn event_types_in_range(
        &self,
        start: &str,
        end: &str,
        actor_login_h: Option<&str>,
    ) -> StorageResult<RowCursor<String>>;

    /// All pull requests whose state is "closed".
    async fn closed_pull_requests(&self) -> StorageResult<RowCursor<PullRequestRow>>;

    /// Logins of every pull-request submitter against `repo_full_name_h`,
    /// any state, duplicates included.
    async fn pull_request_submitters(
        &self,
        repo_full_name_h: &str,
    ) -> StorageResult<RowCursor<String>>;

    /// All issue state rows.
    async fn issues(&self) -> StorageResult<RowCursor<IssueRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_cursor_is_consumed_once() {
        let mut cursor = RowCursor::from_vec(vec![1, 2, 3]);
        assert_eq!(cursor.by_ref().sum::<i32>(), 6);
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_row_cursor_empty() {
        let cursor: RowCursor<String> = RowCursor::empty();
        assert_eq!(cursor.count(), 0);
    }
}
