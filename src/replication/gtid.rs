//! Global transaction identifiers.
//!
//! A position in the replication stream is a
//! `<domain>-<source-id>-<sequence>` triple. The committed cursor is the
//! only state that survives a reconnect, so the string form must
//! round-trip exactly.

use std::fmt;
use std::str::FromStr;

use super::errors::ReplicationError;

/// One replication stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtidPosition {
    pub domain: u32,
    pub source_id: u32,
    pub sequence: u64,
}

impl GtidPosition {
    pub fn new(domain: u32, source_id: u32, sequence: u64) -> Self {
        Self {
            domain,
            source_id,
            sequence,
        }
    }

    /// The next sequence number in the same domain and source.
    pub fn next(&self) -> Self {
        Self {
            sequence: self.sequence + 1,
            ..*self
        }
    }
}

impl fmt::Display for GtidPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.domain, self.source_id, self.sequence)
    }
}

impl FromStr for GtidPosition {
    type Err = ReplicationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ReplicationError::InvalidGtid(raw.to_string());

        let mut parts = raw.split('-');
        let domain = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let source_id = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let sequence = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            domain,
            source_id,
            sequence,
        })
    }
}
