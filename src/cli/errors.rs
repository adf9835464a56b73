//! CLI error types.

use std::fmt;

/// CLI error.
#[derive(Debug, Clone)]
pub struct CliError {
    kind: CliErrorKind,
    message: String,
}

/// CLI error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorKind {
    /// File could not be read
    Io,

    /// Configuration failed validation
    InvalidConfig,

    /// Journal file failed to decode
    InvalidJournal,
}

impl CliError {
    pub fn new(kind: CliErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(CliErrorKind::Io, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(CliErrorKind::InvalidConfig, message)
    }

    pub fn invalid_journal(message: impl Into<String>) -> Self {
        Self::new(CliErrorKind::InvalidJournal, message)
    }

    /// Stable error code for machine-readable output.
    pub fn code_str(&self) -> &'static str {
        match self.kind {
            CliErrorKind::Io => "IO_ERROR",
            CliErrorKind::InvalidConfig => "INVALID_CONFIG",
            CliErrorKind::InvalidJournal => "INVALID_JOURNAL",
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
