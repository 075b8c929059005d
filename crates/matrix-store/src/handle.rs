//! SurrealDB History Store - Connection and Queries
//!
//! Manages the connection to the historical corpus and implements
//! [`HistoryStore`] on top of it.
//!
//! Supports in-memory (`mem://`), local file (`surrealkv://`) and remote
//! (`ws://`, `wss://`) endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::migrations;
use crate::schema::{EventRow, IssueRow, PullRequestRow, RepoProfile, UserProfile};
use crate::storage_traits::{HistoryStore, RowCursor, StorageResult};
use crate::Result;

/// Connection settings for the historical store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. "mem://", "surrealkv://data/history", "wss://host")
    pub endpoint: String,
    /// Database username, if the endpoint requires authentication
    pub username: Option<String>,
    /// Database password
    pub password: Option<String>,
    /// Namespace (default: "matrix")
    pub namespace: String,
    /// Database name (default: "history")
    pub database: String,
    /// Whether the credentials belong to a root user
    pub is_root: bool,
}

impl StoreConfig {
    /// Unauthenticated configuration for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: None,
            password: None,
            namespace: "matrix".to_string(),
            database: "history".to_string(),
            is_root: false,
        }
    }

    /// Attach credentials for a database user
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - MATRIX_STORE_URL (required)
    /// - MATRIX_STORE_USERNAME / MATRIX_STORE_PASSWORD (optional, both or neither)
    /// - MATRIX_STORE_NAMESPACE (optional, default: "matrix")
    /// - MATRIX_STORE_DATABASE (optional, default: "history")
    /// - MATRIX_STORE_ROOT (optional, default: "false")
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("MATRIX_STORE_URL")
            .map_err(|_| StoreError::Config("MATRIX_STORE_URL not set".to_string()))?;

        let mut config = Self::new(endpoint);
        if let Ok(ns) = std::env::var("MATRIX_STORE_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("MATRIX_STORE_DATABASE") {
            config.database = db;
        }
        config.username = std::env::var("MATRIX_STORE_USERNAME").ok();
        config.password = std::env::var("MATRIX_STORE_PASSWORD").ok();
        config.is_root = std::env::var("MATRIX_STORE_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        config.validate()?;
        Ok(config)
    }

    /// Check that credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        match (&self.username, &self.password) {
            (Some(_), None) => Err(StoreError::Config(
                "username given without a password".to_string(),
            )),
            (None, Some(_)) => Err(StoreError::Config(
                "password given without a username".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// SurrealDB-backed implementation of [`HistoryStore`].
#[derive(Clone)]
pub struct SurrealHistoryStore {
    db: Surreal<Any>,
}

#[derive(Deserialize)]
struct CountRow {
    total: u64,
}

impl SurrealHistoryStore {
    /// Create an in-memory instance (tests and dry runs).
    pub async fn in_memory() -> Result<Self> {
        Self::connect(StoreConfig::new("mem://")).await
    }

    /// Create from environment variables, see [`StoreConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::connect(StoreConfig::from_env()?).await
    }

    /// Connect, authenticate if configured, select namespace/database and
    /// make sure the schema exists.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        info!("Connecting to history store");

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            if config.is_root {
                db.signin(Root { username, password })
                    .await
                    .map_err(|e| StoreError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username,
                    password,
                })
                .await
                .map_err(|e| StoreError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        migrations::init_schema(&db)
            .await
            .map_err(|e| StoreError::SchemaSetup(e.to_string()))?;

        info!("History store connected");
        Ok(Self { db })
    }

    // ========== Loading ==========
    //
    // The agents never write; these exist so fixtures and dry runs can
    // stand up a corpus in a fresh database.

    /// Insert a user profile
    pub async fn insert_user(&self, user: UserProfile) -> Result<()> {
        let _created: Option<UserProfile> = self.db.create("users").content(user).await?;
        Ok(())
    }

    /// Insert a repository profile at its ordinal
    pub async fn insert_repo(&self, repo: RepoProfile) -> Result<()> {
        let _created: Option<RepoProfile> = self.db.create("repositories").content(repo).await?;
        Ok(())
    }

    /// Append an event to the activity log
    pub async fn insert_event(&self, event: EventRow) -> Result<()> {
        let _created: Option<EventRow> = self.db.create("events").content(event).await?;
        Ok(())
    }

    /// Insert a pull-request state row
    pub async fn insert_pull_request(&self, pr: PullRequestRow) -> Result<()> {
        let _created: Option<PullRequestRow> = self.db.create("pr_states").content(pr).await?;
        Ok(())
    }

    /// Insert an issue state row
    pub async fn insert_issue(&self, issue: IssueRow) -> Result<()> {
        let _created: Option<IssueRow> = self.db.create("issue_states").content(issue).await?;
        Ok(())
    }
}

fn query_err(e: surrealdb::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn decode_err(e: surrealdb::Error) -> StoreError {
    StoreError::Deserialization(e.to_string())
}

#[async_trait]
impl HistoryStore for SurrealHistoryStore {
    #[instrument(skip(self))]
    async fn user_profile(&self, login_h: &str) -> StorageResult<Option<UserProfile>> {
        let login_owned = login_h.to_string();

        let mut res = self
            .db
            .query(
                "SELECT login_h, public_repos, followers, following FROM users \
                 WHERE login_h = $login LIMIT 1",
            )
            .bind(("login", login_owned))
            .await
            .map_err(query_err)?;

        let rows: Vec<UserProfile> = res.take(0).map_err(decode_err)?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn repo_by_ordinal(&self, ordinal: u64) -> StorageResult<Option<RepoProfile>> {
        let mut res = self
            .db
            .query(
                "SELECT ordinal, full_name_h, watchers_count, forks_count, \
                 issue_open_count, issue_total_count FROM repositories \
                 WHERE ordinal = $ordinal LIMIT 1",
            )
            .bind(("ordinal", ordinal))
            .await
            .map_err(query_err)?;

        let rows: Vec<RepoProfile> = res.take(0).map_err(decode_err)?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn repo_count(&self) -> StorageResult<u64> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM repositories GROUP ALL")
            .await
            .map_err(query_err)?;

        let rows: Vec<CountRow> = res.take(0).map_err(decode_err)?;
        Ok(rows.into_iter().next().map(|r| r.total).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn event_types_in_range(
        &self,
        start: &str,
        end: &str,
        actor_login_h: Option<&str>,
    ) -> StorageResult<RowCursor<String>> {
        let start_owned = start.to_string();
        let end_owned = end.to_string();

        let mut res = match actor_login_h {
            Some(actor) => self
                .db
                .query(
                    "SELECT VALUE event_type FROM events \
                     WHERE actor_login_h = $actor AND created_at >= $start AND created_at < $end",
                )
                .bind(("actor", actor.to_string()))
                .bind(("start", start_owned))
                .bind(("end", end_owned))
                .await
                .map_err(query_err)?,
            None => self
                .db
                .query(
                    "SELECT VALUE event_type FROM events \
                     WHERE created_at >= $start AND created_at < $end",
                )
                .bind(("start", start_owned))
                .bind(("end", end_owned))
                .await
                .map_err(query_err)?,
        };

        let types: Vec<String> = res.take(0).map_err(decode_err)?;
        debug!(rows = types.len(), "event window fetched");
        Ok(RowCursor::from_vec(types))
    }

    #[instrument(skip(self))]
    async fn closed_pull_requests(&self) -> StorageResult<RowCursor<PullRequestRow>> {
        let mut res = self
            .db
            .query(
                "SELECT user_login_h, base_repo_full_name_h, state, merged, created_at, merged_at \
                 FROM pr_states WHERE state = 'closed'",
            )
            .await
            .map_err(query_err)?;

        let rows: Vec<PullRequestRow> = res.take(0).map_err(decode_err)?;
        debug!(rows = rows.len(), "closed pull requests fetched");
        Ok(RowCursor::from_vec(rows))
    }

    #[instrument(skip(self))]
    async fn pull_request_submitters(
        &self,
        repo_full_name_h: &str,
    ) -> StorageResult<RowCursor<String>> {
        let repo_owned = repo_full_name_h.to_string();

        let mut res = self
            .db
            .query(
                "SELECT VALUE user_login_h FROM pr_states \
                 WHERE base_repo_full_name_h = $repo AND user_login_h != NONE",
            )
            .bind(("repo", repo_owned))
            .await
            .map_err(query_err)?;

        let users: Vec<String> = res.take(0).map_err(decode_err)?;
        Ok(RowCursor::from_vec(users))
    }

    #[instrument(skip(self))]
    async fn issues(&self) -> StorageResult<RowCursor<IssueRow>> {
        let mut res = self
            .db
            .query("SELECT user_login_h, state, comments FROM issue_states")
            .await
            .map_err(query_err)?;

        let rows: Vec<IssueRow> = res.take(0).map_err(decode_err)?;
        Ok(RowCursor::from_vec(rows))
    }
}
