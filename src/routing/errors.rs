//! Router error types.

use std::fmt;

/// Routing error.
#[derive(Debug, Clone)]
pub struct RoutingError {
    /// Error kind
    pub kind: RoutingErrorKind,
    /// Error message
    pub message: String,
}

/// Routing error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingErrorKind {
    /// An unsupported router option was configured
    InvalidOption,

    /// No backend satisfied the role filter at session creation
    NoEligibleBackend,

    /// The backend connection could not be opened
    ConnectFailed,

    /// The session's backend is no longer a valid target
    SessionInvalid,

    /// Writing a packet to the backend failed
    WriteFailed,
}

impl RoutingError {
    pub fn new(kind: RoutingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::new(RoutingErrorKind::InvalidOption, message)
    }

    pub fn no_eligible_backend(message: impl Into<String>) -> Self {
        Self::new(RoutingErrorKind::NoEligibleBackend, message)
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::new(RoutingErrorKind::ConnectFailed, message)
    }

    pub fn session_invalid(message: impl Into<String>) -> Self {
        Self::new(RoutingErrorKind::SessionInvalid, message)
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::new(RoutingErrorKind::WriteFailed, message)
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for RoutingError {}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;
