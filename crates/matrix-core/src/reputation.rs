//! Reputation scoring from pull-request and issue history.
//!
//! - `compute_merge_fractions`: share of closed pull requests merged
//!   promptly, per submitter and per target repository
//! - `repo_quality`: mean merge fraction of a repository's submitters
//! - `issue_comment_fractions`: share of a user's issues that drew at least
//!   two comments

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDateTime};
use matrix_store::{HistoryStore, PullRequestRow, HISTORY_TIME_FORMAT};
use tracing::instrument;

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs::emit_row_skipped;

/// Issues with at least this many comments count as discussed.
pub const DISCUSSED_ISSUE_MIN_COMMENTS: i64 = 2;

/// Merge fractions keyed by submitter login and by repository name.
///
/// Keys only exist for users and repositories with at least one usable
/// closed pull request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeFractions {
    pub by_user: HashMap<String, f64>,
    pub by_repo: HashMap<String, f64>,
}

impl MergeFractions {
    /// Fraction for `user`, 0.0 when absent.
    pub fn user(&self, user: &str) -> f64 {
        self.by_user.get(user).copied().unwrap_or(0.0)
    }

    /// Fraction for `repo`, 0.0 when absent.
    pub fn repo(&self, repo: &str) -> f64 {
        self.by_repo.get(repo).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    hits: u64,
    misses: u64,
}

impl Tally {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    fn fraction(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

fn into_fractions(tallies: HashMap<String, Tally>) -> HashMap<String, f64> {
    tallies
        .into_iter()
        .filter_map(|(k, t)| t.fraction().map(|f| (k, f)))
        .collect()
}

#[derive(Debug, thiserror::Error)]
enum RowDefect {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("bad {field} timestamp {value:?}")]
    BadTimestamp { field: &'static str, value: String },
}

fn parse_ts(field: &'static str, value: Option<&str>) -> std::result::Result<NaiveDateTime, RowDefect> {
    let value = value.ok_or(RowDefect::Missing(field))?;
    NaiveDateTime::parse_from_str(value, HISTORY_TIME_FORMAT).map_err(|_| RowDefect::BadTimestamp {
        field,
        value: value.to_string(),
    })
}

/// Classify one closed pull request: `(user, repo, merged_promptly)`.
///
/// Timestamps are only required when the request was merged.
fn merge_outcome(
    pr: PullRequestRow,
    merge_period: Duration,
) -> std::result::Result<(String, String, bool), RowDefect> {
    let user = pr.user_login_h.ok_or(RowDefect::Missing("user_login_h"))?;
    let repo = pr
        .base_repo_full_name_h
        .ok_or(RowDefect::Missing("base_repo_full_name_h"))?;

    let promptly = if pr.merged.unwrap_or(false) {
        let created = parse_ts("created_at", pr.created_at.as_deref())?;
        let merged = parse_ts("merged_at", pr.merged_at.as_deref())?;
        merged - created <= merge_period
    } else {
        false
    };
    Ok((user, repo, promptly))
}

/// Scan every closed pull request and compute prompt-merge fractions.
///
/// A request counts as merged when it was merged no later than
/// `merge_period` after creation. Unusable rows are skipped.
#[instrument(skip(store))]
pub async fn compute_merge_fractions(
    store: &dyn HistoryStore,
    merge_period: Duration,
) -> Result<MergeFractions> {
    let mut users: HashMap<String, Tally> = HashMap::new();
    let mut repos: HashMap<String, Tally> = HashMap::new();

    for pr in store.closed_pull_requests().await? {
        match merge_outcome(pr, merge_period) {
            Ok((user, repo, promptly)) => {
                users.entry(user).or_default().record(promptly);
                repos.entry(repo).or_default().record(promptly);
            }
            Err(defect) => {
                METRICS.inc_rows_skipped();
                emit_row_skipped("pr_states", &defect);
            }
        }
    }

    Ok(MergeFractions {
        by_user: into_fractions(users),
        by_repo: into_fractions(repos),
    })
}

/// Mean merge fraction over the distinct pull-request submitters of
/// `repo_id`. Submitters without closed requests contribute 0.0; a
/// repository nobody submitted to scores 0.0.
pub async fn repo_quality(
    store: &dyn HistoryStore,
    repo_id: &str,
    by_user: &HashMap<String, f64>,
) -> Result<f64> {
    let submitters: BTreeSet<String> = store.pull_request_submitters(repo_id).await?.collect();
    if submitters.is_empty() {
        return Ok(0.0);
    }

    let sum: f64 = submitters
        .iter()
        .map(|u| by_user.get(u).copied().unwrap_or(0.0))
        .sum();
    Ok(sum / submitters.len() as f64)
}

/// Per user, the fraction of their issues with at least two comments.
///
/// Rows with no user or a non-numeric comment count are skipped.
#[instrument(skip(store))]
pub async fn issue_comment_fractions(store: &dyn HistoryStore) -> Result<HashMap<String, f64>> {
    let mut users: HashMap<String, Tally> = HashMap::new();

    for issue in store.issues().await? {
        let (Some(user), Some(comments)) = (issue.user_login_h.clone(), issue.comment_count()) else {
            METRICS.inc_rows_skipped();
            emit_row_skipped("issue_states", &"missing user or comment count");
            continue;
        };
        users
            .entry(user)
            .or_default()
            .record(comments >= DISCUSSED_ISSUE_MIN_COMMENTS);
    }

    Ok(into_fractions(users))
}
