//! Domain-level error taxonomy for Matrix agents.

use matrix_store::StoreError;

use crate::config::ConfigError;
use crate::oracle::OracleError;
use crate::rpc::RpcError;

/// Errors produced by value validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown event type: {name}")]
    UnknownEventType { name: String },

    #[error("unknown event set: {name} (expected core or extended)")]
    UnknownEventSet { name: String },

    #[error("invalid round window: start {start} is not before end {end}")]
    EmptyRoundWindow { start: i64, end: i64 },

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

/// Matrix agent errors.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("agent not found in history store: {agent}")]
    AgentNotFound { agent: String },

    #[error("repository corpus is empty")]
    EmptyCorpus,

    #[error("no repository found after {attempts} samples over ordinals 1..={num_repos}")]
    SamplingExhausted { attempts: u32, num_repos: u64 },

    #[error("agent id file not found: {0}")]
    AgentIdsMissing(std::path::PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Rpc(#[from] RpcError),

    #[error("decision oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Matrix agent operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_error_display() {
        let err = MatrixError::AgentNotFound {
            agent: "u_42".to_string(),
        };
        assert!(err.to_string().contains("agent not found"));
        assert!(err.to_string().contains("u_42"));

        let err = MatrixError::SamplingExhausted {
            attempts: 3,
            num_repos: 1000,
        };
        assert!(err.to_string().contains("after 3 samples"));
        assert!(err.to_string().contains("1..=1000"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: MatrixError = StoreError::Query("boom".to_string()).into();
        assert!(err.to_string().contains("store error"));
        assert!(err.to_string().contains("boom"));
    }
}
