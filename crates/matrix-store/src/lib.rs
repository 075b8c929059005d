//! Matrix-Store: historical event store for Matrix agents
//!
//! This crate provides the read side of the historical corpus the agents
//! reason about: user profiles, repository profiles, the event log, and
//! pull-request / issue state snapshots.
//!
//! ## Key Components
//!
//! - `HistoryStore`: backend-agnostic async query trait
//! - `RowCursor`: finite, consume-once result sequence returned by scans
//! - `SurrealHistoryStore`: SurrealDB-backed implementation
//! - `MemoryHistoryStore`: in-memory fake for tests

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;

pub use error::StoreError;
pub use handle::{StoreConfig, SurrealHistoryStore};
pub use schema::{EventRow, IssueRow, PullRequestRow, RepoProfile, UserProfile, HISTORY_TIME_FORMAT};
pub use storage_traits::{HistoryStore, RowCursor, StorageResult};

/// Result type for matrix-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
