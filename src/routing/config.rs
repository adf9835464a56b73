//! Router option parsing.
//!
//! `router_options` is a comma/whitespace-separated set of role words.
//! It compiles to a `(mask, value)` pair checked against a backend's
//! flag word: a backend is eligible when
//! `(flags & mask) == (mask & value)` and it is running.

use crate::server::StatusFlags;

use super::errors::{RoutingError, RoutingResult};

/// Compiled role filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFilter {
    pub mask: u64,
    pub value: u64,
}

impl RoleFilter {
    /// The default filter: any running backend.
    pub fn running() -> Self {
        Self {
            mask: StatusFlags::RUNNING,
            value: StatusFlags::RUNNING,
        }
    }

    /// True when `flags` satisfies this filter.
    pub fn matches(&self, flags: StatusFlags) -> bool {
        flags.is_running() && (flags.bits() & self.mask) == (self.mask & self.value)
    }

    /// Pack into a single word so the router can swap its filter
    /// atomically. Both halves fit in 32 bits.
    pub fn packed(&self) -> u64 {
        debug_assert!(self.mask < (1 << 32) && self.value < (1 << 32));
        self.mask | (self.value << 32)
    }

    pub fn from_packed(raw: u64) -> Self {
        Self {
            mask: raw & 0xffff_ffff,
            value: raw >> 32,
        }
    }
}

/// Parse `router_options` tokens into a filter.
pub fn parse_router_options(tokens: &[String]) -> RoutingResult<RoleFilter> {
    let mut mask = 0u64;
    let mut value = 0u64;

    for token in tokens {
        match token.to_ascii_lowercase().as_str() {
            "master" => {
                mask |= StatusFlags::MASTER | StatusFlags::SLAVE;
                value |= StatusFlags::MASTER;
            }
            "slave" => {
                mask |= StatusFlags::MASTER | StatusFlags::SLAVE;
                value |= StatusFlags::SLAVE;
            }
            "running" => {
                mask |= StatusFlags::RUNNING;
                value |= StatusFlags::RUNNING;
            }
            "synced" => {
                mask |= StatusFlags::JOINED;
                value |= StatusFlags::JOINED;
            }
            "ndb" => {
                mask |= StatusFlags::NDB;
                value |= StatusFlags::NDB;
            }
            other => {
                return Err(RoutingError::invalid_option(format!(
                    "unsupported router option '{}', expected one of \
                     [master|slave|running|synced|ndb]",
                    other
                )));
            }
        }
    }

    if mask == 0 && value == 0 {
        return Ok(RoleFilter::running());
    }

    Ok(RoleFilter { mask, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(bits: u64) -> StatusFlags {
        StatusFlags::from_bits(bits)
    }

    #[test]
    fn test_empty_defaults_to_running() {
        let filter = parse_router_options(&[]).unwrap();
        assert_eq!(filter, RoleFilter::running());
        assert!(filter.matches(flags(StatusFlags::RUNNING)));
        assert!(!filter.matches(flags(0)));
    }

    #[test]
    fn test_master_option() {
        let filter = parse_router_options(&["master".to_string()]).unwrap();
        assert!(filter.matches(flags(StatusFlags::RUNNING | StatusFlags::MASTER)));
        assert!(!filter.matches(flags(StatusFlags::RUNNING | StatusFlags::SLAVE)));
        assert!(!filter.matches(flags(StatusFlags::RUNNING)));
        // A master that is not running never matches.
        assert!(!filter.matches(flags(StatusFlags::MASTER)));
    }

    #[test]
    fn test_slave_option() {
        let filter = parse_router_options(&["slave".to_string()]).unwrap();
        assert!(filter.matches(flags(StatusFlags::RUNNING | StatusFlags::SLAVE)));
        assert!(!filter.matches(flags(StatusFlags::RUNNING | StatusFlags::MASTER)));
    }

    #[test]
    fn test_synced_option() {
        let filter = parse_router_options(&["synced".to_string()]).unwrap();
        assert!(filter.matches(flags(StatusFlags::RUNNING | StatusFlags::JOINED)));
        assert!(!filter.matches(flags(StatusFlags::RUNNING)));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = parse_router_options(&["primary".to_string()]).unwrap_err();
        assert_eq!(err.kind, crate::routing::RoutingErrorKind::InvalidOption);
    }

    #[test]
    fn test_packed_round_trip() {
        let filter = parse_router_options(&["slave".to_string(), "running".to_string()]).unwrap();
        assert_eq!(RoleFilter::from_packed(filter.packed()), filter);
    }
}
