//! Structured JSON logger.
//!
//! - One log line per event, synchronous, unbuffered.
//! - Deterministic key ordering: `event` first, then `severity`, then the
//!   caller's fields sorted by key.
//! - ERROR and FATAL go to stderr, everything else to stdout.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log field: key and already-rendered value.
pub type Field<'a> = (&'a str, &'a str);

/// Synchronous structured logger.
///
/// All methods are associated functions; the logger carries no state, so
/// every subsystem logs through the same code path without coordination.
pub struct Logger;

impl Logger {
    /// Log at TRACE level.
    pub fn trace(event: &str, fields: &[Field<'_>]) {
        Self::emit(Severity::Trace, event, fields);
    }

    /// Log at INFO level.
    pub fn info(event: &str, fields: &[Field<'_>]) {
        Self::emit(Severity::Info, event, fields);
    }

    /// Log at WARN level.
    pub fn warn(event: &str, fields: &[Field<'_>]) {
        Self::emit(Severity::Warn, event, fields);
    }

    /// Log at ERROR level.
    pub fn error(event: &str, fields: &[Field<'_>]) {
        Self::emit(Severity::Error, event, fields);
    }

    /// Log at FATAL level.
    pub fn fatal(event: &str, fields: &[Field<'_>]) {
        Self::emit(Severity::Fatal, event, fields);
    }

    fn emit(severity: Severity, event: &str, fields: &[Field<'_>]) {
        if severity >= Severity::Error {
            Self::render_to(severity, event, fields, &mut io::stderr());
        } else {
            Self::render_to(severity, event, fields, &mut io::stdout());
        }
    }

    /// Render one event to the given writer. Split out so tests can capture
    /// the exact bytes.
    fn render_to<W: Write>(severity: Severity, event: &str, fields: &[Field<'_>], out: &mut W) {
        let mut line = String::with_capacity(128 + fields.len() * 32);

        line.push_str("{\"event\":\"");
        escape_into(&mut line, event);
        line.push_str("\",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut ordered: Vec<&Field<'_>> = fields.iter().collect();
        ordered.sort_by_key(|(key, _)| *key);

        for (key, value) in ordered {
            line.push_str(",\"");
            escape_into(&mut line, key);
            line.push_str("\":\"");
            escape_into(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");

        // One write_all per event so concurrent threads interleave at line
        // granularity only.
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
}

/// Render a log event to a string, for test assertions.
#[cfg(test)]
pub fn capture(severity: Severity, event: &str, fields: &[Field<'_>]) -> String {
    let mut buffer = Vec::new();
    Logger::render_to(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}
