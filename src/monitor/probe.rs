//! Backend probing seam.
//!
//! Wire-protocol details live outside this crate; the monitor talks to
//! backends through the [`Connector`] and [`ProbeConnection`] traits.
//! `ping_or_connect` implements the reuse-then-reconnect policy on top of
//! them.

use std::fmt;
use std::time::Duration;

use crate::server::{Backend, Credentials, StatusFlags};

/// Why a probe attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// Connection was refused or dropped
    Refused,

    /// The connect attempt exceeded the configured timeout
    TimedOut,

    /// The backend rejected the probe credentials
    AccessDenied,

    /// A query on an established connection failed
    Query,
}

/// A probe failure.
#[derive(Debug, Clone)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Refused, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::TimedOut, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::AccessDenied, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Query, message)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProbeError {}

/// Role and topology facts discovered from one probed backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleInfo {
    pub master: bool,
    pub slave: bool,
    pub joined: bool,
    pub ndb: bool,
    /// This node's replication id; -1 when the backend does not expose one.
    pub node_id: i64,
    /// The id of the node this one replicates from; -1 for none.
    pub master_id: i64,
}

impl RoleInfo {
    /// The status bits this discovery result contributes.
    pub fn role_bits(&self) -> u64 {
        let mut bits = 0;
        if self.master {
            bits |= StatusFlags::MASTER;
        }
        if self.slave {
            bits |= StatusFlags::SLAVE;
        }
        if self.joined {
            bits |= StatusFlags::JOINED;
        }
        if self.ndb {
            bits |= StatusFlags::NDB;
        }
        bits
    }
}

/// Disk usage for one mounted path on a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpaceUsage {
    pub path: String,
    pub total: u64,
    pub available: u64,
}

impl DiskSpaceUsage {
    pub fn new(path: impl Into<String>, total: u64, available: u64) -> Self {
        Self {
            path: path.into(),
            total,
            available,
        }
    }

    /// Used percentage, rounded down. Zero-sized mounts count as full.
    pub fn used_percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let used = self.total.saturating_sub(self.available);
        ((used * 100) / self.total) as u8
    }
}

/// Why disk usage could not be read.
#[derive(Debug, Clone)]
pub enum DiskSpaceError {
    /// The backend does not expose disk information. The monitor disables
    /// further checks for this backend.
    Unsupported(String),

    /// Transient failure; the next interval retries.
    Query(String),
}

/// One open probe connection to a backend.
pub trait ProbeConnection: Send {
    /// Cheap liveness check on the existing connection.
    fn ping(&mut self) -> bool;

    /// Module-specific role discovery.
    fn discover_roles(&mut self) -> Result<RoleInfo, ProbeError>;

    /// Per-path disk usage.
    fn disk_space(&mut self) -> Result<Vec<DiskSpaceUsage>, DiskSpaceError>;

    /// Run the module's permission-check query.
    fn check_permissions(&mut self, query: &str) -> Result<(), ProbeError>;
}

/// Connection settings used for each probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            connect_attempts: 1,
        }
    }
}

impl ConnectionSettings {
    /// Settings with the backend's credential override applied, when set.
    pub fn for_backend(&self, backend: &Backend) -> ConnectionSettings {
        let mut settings = self.clone();
        if let Some(Credentials { user, password }) = backend.probe_credentials() {
            settings.user = user;
            settings.password = password;
        }
        settings
    }
}

/// Opens probe connections. Implemented outside this crate for real
/// backends and by mocks in tests.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        backend: &Backend,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ProbeConnection>, ProbeError>;
}

/// Result of the per-tick ping-or-connect step.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// The existing connection still answers
    ExistingOk,
    /// A fresh connection was opened
    NewOk,
    /// All attempts failed
    Failed(ProbeError),
}

impl ConnectOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectOutcome::ExistingOk | ConnectOutcome::NewOk)
    }
}

/// Reuse the connection if it pings, otherwise reconnect up to
/// `connect_attempts` times. The handle is left in place on success and
/// cleared on failure.
pub fn ping_or_connect(
    connector: &dyn Connector,
    backend: &Backend,
    settings: &ConnectionSettings,
    conn: &mut Option<Box<dyn ProbeConnection>>,
) -> ConnectOutcome {
    if let Some(existing) = conn.as_mut() {
        if existing.ping() {
            return ConnectOutcome::ExistingOk;
        }
        *conn = None;
    }

    let settings = settings.for_backend(backend);
    let mut last_error = ProbeError::refused("no connect attempts configured");

    for _ in 0..settings.connect_attempts.max(1) {
        match connector.connect(backend, &settings) {
            Ok(new_conn) => {
                *conn = Some(new_conn);
                return ConnectOutcome::NewOk;
            }
            Err(err) => last_error = err,
        }
    }

    ConnectOutcome::Failed(last_error)
}
