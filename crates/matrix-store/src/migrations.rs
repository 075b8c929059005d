//! SurrealDB schema initialization for the historical store
//!
//! Defines the five tables the agents read from, with the indexes the
//! per-round queries rely on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all historical-store tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Matrix history schema");

    init_users_table(db).await?;
    init_repositories_table(db).await?;
    init_events_table(db).await?;
    init_pr_states_table(db).await?;
    init_issue_states_table(db).await?;

    info!("Matrix history schema initialization complete");
    Ok(())
}

/// Initialize `users` table
///
/// Schema:
/// ```text
/// TABLE users {
///   login_h:       STRING (unique)
///   public_repos:  INT
///   followers:     INT
///   following:     INT
/// }
/// ```
async fn init_users_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing users table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_login_h ON TABLE users COLUMNS login_h UNIQUE;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize `repositories` table
///
/// Schema:
/// ```text
/// TABLE repositories {
///   ordinal:            INT (unique, 1-based sampling position)
///   full_name_h:        STRING
///   watchers_count:     INT
///   forks_count:        INT
///   issue_open_count:   INT
///   issue_total_count:  INT? (null in part of the corpus)
/// }
/// ```
async fn init_repositories_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing repositories table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS repositories SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_ordinal ON TABLE repositories COLUMNS ordinal UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_full_name_h ON TABLE repositories COLUMNS full_name_h;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize `events` table
///
/// Schema:
/// ```text
/// TABLE events {
///   event_type:        STRING
///   actor_login_h:     STRING
///   repo_full_name_h:  STRING
///   created_at:        STRING (HISTORY_TIME_FORMAT)
/// }
/// ```
async fn init_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing events table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS events SCHEMALESS;

        -- Window counts across all users
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE events COLUMNS created_at;

        -- Window counts for a single actor
        DEFINE INDEX IF NOT EXISTS idx_actor_created_at ON TABLE events COLUMNS actor_login_h, created_at;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize `pr_states` table
///
/// Schema:
/// ```text
/// TABLE pr_states {
///   user_login_h:           STRING?
///   base_repo_full_name_h:  STRING?
///   state:                  STRING ("open" | "closed")
///   merged:                 BOOL?
///   created_at:             STRING?
///   merged_at:              STRING?
/// }
/// ```
async fn init_pr_states_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing pr_states table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS pr_states SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_state ON TABLE pr_states COLUMNS state;
        DEFINE INDEX IF NOT EXISTS idx_base_repo ON TABLE pr_states COLUMNS base_repo_full_name_h;
    "#;

    db.query(sql).await?;
    Ok(())
}

/// Initialize `issue_states` table
async fn init_issue_states_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing issue_states table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS issue_states SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_issue_user ON TABLE issue_states COLUMNS user_login_h;
    "#;

    db.query(sql).await?;
    Ok(())
}
