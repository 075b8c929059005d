//! Record definitions for the historical store tables
//!
//! Tables:
//! - user: agent profiles keyed by anonymized login
//! - repository: repository profiles keyed by ordinal position
//! - event: the platform activity log
//! - pr_state: last-known state of each pull request
//! - issue_state: last-known state of each issue

use serde::{Deserialize, Serialize};

/// Timestamp format used by every string timestamp in the store.
///
/// Fixed width and zero padded, so lexicographic order is chronological
/// order and range filters can compare the raw strings.
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Profile counters for one user (agent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Anonymized login
    pub login_h: String,
    /// Number of public repositories
    pub public_repos: u64,
    /// Number of followers
    pub followers: u64,
    /// Number of followed users
    pub following: u64,
}

impl UserProfile {
    pub fn new(login_h: impl Into<String>, public_repos: u64, followers: u64, following: u64) -> Self {
        Self {
            login_h: login_h.into(),
            public_repos,
            followers,
            following,
        }
    }
}

/// Profile counters for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoProfile {
    /// Ordinal position used for random sampling (1-based)
    pub ordinal: u64,
    /// Anonymized full name (`owner/name`)
    pub full_name_h: String,
    pub watchers_count: u64,
    pub forks_count: u64,
    pub issue_open_count: u64,
    /// Some historical rows carry no total; see [`RepoProfile::issue_total_or_open`]
    pub issue_total_count: Option<u64>,
}

impl RepoProfile {
    pub fn new(
        ordinal: u64,
        full_name_h: impl Into<String>,
        watchers_count: u64,
        forks_count: u64,
        issue_open_count: u64,
        issue_total_count: Option<u64>,
    ) -> Self {
        Self {
            ordinal,
            full_name_h: full_name_h.into(),
            watchers_count,
            forks_count,
            issue_open_count,
            issue_total_count,
        }
    }

    /// Total issue count, falling back to the open count when the total is null.
    pub fn issue_total_or_open(&self) -> u64 {
        self.issue_total_count.unwrap_or(self.issue_open_count)
    }
}

/// One row of the activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    /// Platform event type name (e.g. "PushEvent")
    pub event_type: String,
    pub actor_login_h: String,
    pub repo_full_name_h: String,
    /// Timestamp in [`HISTORY_TIME_FORMAT`]
    pub created_at: String,
}

impl EventRow {
    pub fn new(
        event_type: impl Into<String>,
        actor_login_h: impl Into<String>,
        repo_full_name_h: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor_login_h: actor_login_h.into(),
            repo_full_name_h: repo_full_name_h.into(),
            created_at: created_at.into(),
        }
    }
}

/// Last-known state of a pull request.
///
/// Every field except `state` is optional because the historical dump is
/// incomplete; consumers decide how to treat missing values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRow {
    pub user_login_h: Option<String>,
    pub base_repo_full_name_h: Option<String>,
    /// "open" or "closed"
    pub state: String,
    pub merged: Option<bool>,
    pub created_at: Option<String>,
    pub merged_at: Option<String>,
}

impl PullRequestRow {
    /// A closed pull request with all fields present.
    pub fn closed(
        user: impl Into<String>,
        repo: impl Into<String>,
        merged: bool,
        created_at: impl Into<String>,
        merged_at: Option<String>,
    ) -> Self {
        Self {
            user_login_h: Some(user.into()),
            base_repo_full_name_h: Some(repo.into()),
            state: "closed".to_string(),
            merged: Some(merged),
            created_at: Some(created_at.into()),
            merged_at,
        }
    }

    /// An open pull request (counts as a submission, never as an outcome).
    pub fn open(user: impl Into<String>, repo: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            user_login_h: Some(user.into()),
            base_repo_full_name_h: Some(repo.into()),
            state: "open".to_string(),
            merged: Some(false),
            created_at: Some(created_at.into()),
            merged_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }
}

/// Last-known state of an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRow {
    pub user_login_h: Option<String>,
    pub state: String,
    /// Comment count as stored; older dumps hold it as a string
    pub comments: Option<serde_json::Value>,
}

impl IssueRow {
    pub fn new(user: impl Into<String>, state: impl Into<String>, comments: u64) -> Self {
        Self {
            user_login_h: Some(user.into()),
            state: state.into(),
            comments: Some(serde_json::Value::from(comments)),
        }
    }

    /// Numeric comment count, if the stored value is an integer or an
    /// integer-valued string.
    pub fn comment_count(&self) -> Option<i64> {
        match self.comments.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_total_falls_back_to_open() {
        let repo = RepoProfile::new(1, "r", 100, 3, 7, None);
        assert_eq!(repo.issue_total_or_open(), 7);

        let repo = RepoProfile::new(1, "r", 100, 3, 7, Some(12));
        assert_eq!(repo.issue_total_or_open(), 12);
    }

    #[test]
    fn test_comment_count_accepts_numbers_and_strings() {
        let mut issue = IssueRow::new("u1", "closed", 3);
        assert_eq!(issue.comment_count(), Some(3));

        issue.comments = Some(json!("5"));
        assert_eq!(issue.comment_count(), Some(5));

        issue.comments = Some(json!("many"));
        assert_eq!(issue.comment_count(), None);

        issue.comments = None;
        assert_eq!(issue.comment_count(), None);
    }

    #[test]
    fn test_pull_request_row_serialization() {
        let pr = PullRequestRow::closed("u1", "r1", true, "2017-01-01T00:00:00Z", None);
        let json = serde_json::to_string(&pr).expect("Failed to serialize");
        assert!(json.contains("\"state\":\"closed\""));
        assert!(json.contains("\"merged\":true"));
        assert!(pr.is_closed());
        assert!(!PullRequestRow::open("u1", "r1", "2017-01-01T00:00:00Z").is_closed());
    }
}
