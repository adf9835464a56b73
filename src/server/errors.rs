//! Backend registry error types.

use std::fmt;

/// Registry error.
#[derive(Debug, Clone)]
pub struct ServerError {
    /// Error kind
    pub kind: ServerErrorKind,
    /// Error message
    pub message: String,
}

/// Registry error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// A backend with the same name is already registered
    DuplicateName,

    /// No backend with the given name exists
    UnknownBackend,
}

impl ServerError {
    pub fn new(kind: ServerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn duplicate_name(message: impl Into<String>) -> Self {
        Self::new(ServerErrorKind::DuplicateName, message)
    }

    pub fn unknown_backend(message: impl Into<String>) -> Self {
        Self::new(ServerErrorKind::UnknownBackend, message)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ServerError {}

/// Result type for registry operations.
pub type ServerResult<T> = Result<T, ServerError>;
