//! Error types for matrix-store

use thiserror::Error;

/// Errors that can occur while reading the historical store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A row could not be decoded into its record type
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Store configuration is incomplete or inconsistent
    #[error("Invalid store configuration: {0}")]
    Config(String),
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
