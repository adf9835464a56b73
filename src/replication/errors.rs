//! Replication stream error types.

use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Replication stream errors.
#[derive(Debug, Clone, Error)]
pub enum ReplicationError {
    /// No source could be reached
    #[error("failed to connect to replication source: {0}")]
    Connect(String),

    /// The preparatory statements failed on the source
    #[error("failed to prepare connection: {0}")]
    Prepare(String),

    /// The replication channel request was rejected
    #[error("failed to open replication channel: {0}")]
    Channel(String),

    /// A transaction-id string did not parse
    #[error("invalid GTID position '{0}'")]
    InvalidGtid(String),

    /// The stream configuration failed validation
    #[error("invalid replication configuration: {0}")]
    Configuration(String),

    /// The downstream sink rejected an effect
    #[error("downstream sink error: {0}")]
    Sink(String),
}
