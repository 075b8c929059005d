//! In-memory fake for the history store (testing only)
//!
//! Provides `MemoryHistoryStore`, which satisfies the `HistoryStore` contract
//! without any external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::{EventRow, IssueRow, PullRequestRow, RepoProfile, UserProfile};
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, UserProfile>,
    repos: BTreeMap<u64, RepoProfile>,
    events: Vec<EventRow>,
    pull_requests: Vec<PullRequestRow>,
    issues: Vec<IssueRow>,
}

/// In-memory history store backed by plain collections.
///
/// Repositories are keyed by ordinal; `push_repo` appends at the next free
/// ordinal while `insert_repo` keeps the ordinal given on the record, which
/// lets tests model gaps.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    tables: Mutex<Tables>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserProfile) {
        let mut tables = self.tables.lock().unwrap();
        tables.users.insert(user.login_h.clone(), user);
    }

    /// Insert a repository at the ordinal carried by the record.
    pub fn insert_repo(&self, repo: RepoProfile) {
        let mut tables = self.tables.lock().unwrap();
        tables.repos.insert(repo.ordinal, repo);
    }

    /// Append a repository at the next ordinal, returning the ordinal used.
    pub fn push_repo(&self, mut repo: RepoProfile) -> u64 {
        let mut tables = self.tables.lock().unwrap();
        let ordinal = tables.repos.keys().next_back().copied().unwrap_or(0) + 1;
        repo.ordinal = ordinal;
        tables.repos.insert(ordinal, repo);
        ordinal
    }

    pub fn insert_event(&self, event: EventRow) {
        let mut tables = self.tables.lock().unwrap();
        tables.events.push(event);
    }

    pub fn insert_pull_request(&self, pr: PullRequestRow) {
        let mut tables = self.tables.lock().unwrap();
        tables.pull_requests.push(pr);
    }

    pub fn insert_issue(&self, issue: IssueRow) {
        let mut tables = self.tables.lock().unwrap();
        tables.issues.push(issue);
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn user_profile(&self, login_h: &str) -> StorageResult<Option<UserProfile>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.get(login_h).cloned())
    }

    async fn repo_by_ordinal(&self, ordinal: u64) -> StorageResult<Option<RepoProfile>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.repos.get(&ordinal).cloned())
    }

    async fn repo_count(&self) -> StorageResult<u64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.repos.len() as u64)
    }

    async fn event_types_in_range(
        &self,
        start: &str,
        end: &str,
        actor_login_h: Option<&str>,
    ) -> StorageResult<RowCursor<String>> {
        let events = self.tables.lock().unwrap().events.clone();
        let start = start.to_string();
        let end = end.to_string();
        let actor = actor_login_h.map(str::to_string);

        Ok(RowCursor::new(
            events
                .into_iter()
                .filter(move |e| {
                    e.created_at.as_str() >= start.as_str()
                        && e.created_at.as_str() < end.as_str()
                        && actor
                            .as_deref()
                            .map(|a| e.actor_login_h == a)
                            .unwrap_or(true)
                })
                .map(|e| e.event_type),
        ))
    }

    async fn closed_pull_requests(&self) -> StorageResult<RowCursor<PullRequestRow>> {
        let prs = self.tables.lock().unwrap().pull_requests.clone();
        Ok(RowCursor::new(prs.into_iter().filter(|pr| pr.is_closed())))
    }

    async fn pull_request_submitters(
        &self,
        repo_full_name_h: &str,
    ) -> StorageResult<RowCursor<String>> {
        let prs = self.tables.lock().unwrap().pull_requests.clone();
        let repo = repo_full_name_h.to_string();
        Ok(RowCursor::new(prs.into_iter().filter_map(move |pr| {
            match (pr.base_repo_full_name_h.as_deref(), pr.user_login_h) {
                (Some(r), Some(user)) if r == repo => Some(user),
                _ => None,
            }
        })))
    }

    async fn issues(&self) -> StorageResult<RowCursor<IssueRow>> {
        let issues = self.tables.lock().unwrap().issues.clone();
        Ok(RowCursor::from_vec(issues))
    }
}
