//! Replication stream configuration.

use super::errors::{ReplicationError, ReplicationResult};
use super::gtid::GtidPosition;

/// Configuration the stream was started with. Immutable once the worker
/// is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorConfig {
    /// Candidate source addresses, tried in order.
    pub sources: Vec<String>,
    /// Credentials for the stream connection.
    pub user: String,
    pub password: String,
    /// Server id announced when requesting the replication channel.
    pub server_id: u32,
    /// Starting position; `None` starts from the beginning of the
    /// source's history.
    pub start_position: Option<GtidPosition>,
}

impl ReplicatorConfig {
    pub fn new(sources: Vec<String>, user: impl Into<String>, password: impl Into<String>, server_id: u32) -> Self {
        Self {
            sources,
            user: user.into(),
            password: password.into(),
            server_id,
            start_position: None,
        }
    }

    pub fn with_start_position(mut self, position: GtidPosition) -> Self {
        self.start_position = Some(position);
        self
    }

    pub fn validate(&self) -> ReplicationResult<()> {
        if self.sources.is_empty() {
            return Err(ReplicationError::Configuration(
                "at least one source address is required".to_string(),
            ));
        }
        if self.server_id == 0 {
            return Err(ReplicationError::Configuration(
                "server_id must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The statements a connector issues before requesting the stream,
    /// in order: checksum handshake, slave capability, connect state at
    /// the cursor, strict GTID mode, duplicate tolerance, charset.
    pub fn preparation_statements(&self, cursor: Option<&GtidPosition>) -> Vec<String> {
        let start = cursor
            .or(self.start_position.as_ref())
            .map(|p| p.to_string())
            .unwrap_or_default();

        vec![
            "SET @master_binlog_checksum = @@global.binlog_checksum".to_string(),
            "SET @mariadb_slave_capability=4".to_string(),
            format!("SET @slave_connect_state='{}'", start),
            "SET @slave_gtid_strict_mode=1".to_string(),
            "SET @slave_gtid_ignore_duplicates=1".to_string(),
            "SET NAMES latin1".to_string(),
        ]
    }
}
