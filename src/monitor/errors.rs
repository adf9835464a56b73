//! Monitor error types.

use std::fmt;

/// Admin-facing message returned when a status change other than
/// maintenance/drain is attempted on a monitored backend.
pub const ERR_CANNOT_MODIFY: &str =
    "the server is monitored, so only the maintenance status can be set/cleared manually";

/// Monitor error.
#[derive(Debug, Clone)]
pub struct MonitorError {
    /// Error kind
    pub kind: MonitorErrorKind,
    /// Error message
    pub message: String,
}

/// Monitor error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorErrorKind {
    /// Operation requires the monitor to be stopped
    NotStopped,

    /// Operation requires the monitor to be running
    NotRunning,

    /// Settings failed validation
    InvalidSettings,

    /// The start-time permission probe failed
    PermissionCheck,

    /// Worker thread could not be spawned
    WorkerSpawn,

    /// Admin tried to change a status bit the monitor owns
    StatusChangeDenied,

    /// The named backend is not monitored by this monitor
    UnknownBackend,

    /// Journal could not be written or read
    Journal,
}

impl MonitorError {
    pub fn new(kind: MonitorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_stopped(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::NotStopped, message)
    }

    pub fn not_running(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::NotRunning, message)
    }

    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::InvalidSettings, message)
    }

    pub fn permission_check(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::PermissionCheck, message)
    }

    pub fn worker_spawn(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::WorkerSpawn, message)
    }

    pub fn status_change_denied() -> Self {
        Self::new(MonitorErrorKind::StatusChangeDenied, ERR_CANNOT_MODIFY)
    }

    pub fn unknown_backend(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::UnknownBackend, message)
    }

    pub fn journal(message: impl Into<String>) -> Self {
        Self::new(MonitorErrorKind::Journal, message)
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MonitorError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for MonitorError {}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
