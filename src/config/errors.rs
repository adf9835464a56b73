//! Configuration error types.

use std::fmt;

/// Configuration error.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Error kind
    pub kind: ConfigErrorKind,
    /// Error message
    pub message: String,
}

/// Configuration error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A required key is absent
    MissingKey,

    /// A value failed to parse or is out of range
    InvalidValue,

    /// A key is not recognized by the consuming component
    UnknownKey,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_key(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::MissingKey, message)
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidValue, message)
    }

    pub fn unknown_key(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::UnknownKey, message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
