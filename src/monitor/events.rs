//! Transition categories.
//!
//! A transition is computed from the previous and current flag words of
//! one backend, both masked to the monitored bits. The category drives
//! event-hook dispatch and the state-change log line.
//!
//! Categories:
//! - UP / DOWN when the RUNNING bit flipped, flavored by the role bits.
//! - LOSS when the backend stayed running but its role bits cleared or
//!   stayed the same while something else in the monitored set changed.
//! - NEW when the backend stayed running and gained or changed role.

use crate::config::{ConfigError, ConfigResult};
use crate::server::StatusFlags;

/// Symbolic transition category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MonitorEvent {
    MasterDown = 1 << 0,
    MasterUp = 1 << 1,
    SlaveDown = 1 << 2,
    SlaveUp = 1 << 3,
    ServerDown = 1 << 4,
    ServerUp = 1 << 5,
    SyncedDown = 1 << 6,
    SyncedUp = 1 << 7,
    NdbDown = 1 << 8,
    NdbUp = 1 << 9,
    LostMaster = 1 << 10,
    LostSlave = 1 << 11,
    LostSynced = 1 << 12,
    LostNdb = 1 << 13,
    NewMaster = 1 << 14,
    NewSlave = 1 << 15,
    NewSynced = 1 << 16,
    NewNdb = 1 << 17,
}

impl MonitorEvent {
    /// All categories, for mask parsing and iteration.
    pub const ALL: [MonitorEvent; 18] = [
        MonitorEvent::MasterDown,
        MonitorEvent::MasterUp,
        MonitorEvent::SlaveDown,
        MonitorEvent::SlaveUp,
        MonitorEvent::ServerDown,
        MonitorEvent::ServerUp,
        MonitorEvent::SyncedDown,
        MonitorEvent::SyncedUp,
        MonitorEvent::NdbDown,
        MonitorEvent::NdbUp,
        MonitorEvent::LostMaster,
        MonitorEvent::LostSlave,
        MonitorEvent::LostSynced,
        MonitorEvent::LostNdb,
        MonitorEvent::NewMaster,
        MonitorEvent::NewSlave,
        MonitorEvent::NewSynced,
        MonitorEvent::NewNdb,
    ];

    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// The name used in the `events` setting and the `$EVENT` hook token.
    pub fn name(self) -> &'static str {
        match self {
            MonitorEvent::MasterDown => "master_down",
            MonitorEvent::MasterUp => "master_up",
            MonitorEvent::SlaveDown => "slave_down",
            MonitorEvent::SlaveUp => "slave_up",
            MonitorEvent::ServerDown => "server_down",
            MonitorEvent::ServerUp => "server_up",
            MonitorEvent::SyncedDown => "synced_down",
            MonitorEvent::SyncedUp => "synced_up",
            MonitorEvent::NdbDown => "ndb_down",
            MonitorEvent::NdbUp => "ndb_up",
            MonitorEvent::LostMaster => "lost_master",
            MonitorEvent::LostSlave => "lost_slave",
            MonitorEvent::LostSynced => "lost_synced",
            MonitorEvent::LostNdb => "lost_ndb",
            MonitorEvent::NewMaster => "new_master",
            MonitorEvent::NewSlave => "new_slave",
            MonitorEvent::NewSynced => "new_synced",
            MonitorEvent::NewNdb => "new_ndb",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }
}

/// Which transition categories fire the event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u32);

impl EventMask {
    /// Every category. The default for the `events` setting.
    pub fn all() -> Self {
        let mut bits = 0;
        for event in MonitorEvent::ALL {
            bits |= event.bit();
        }
        EventMask(bits)
    }

    pub const fn none() -> Self {
        EventMask(0)
    }

    pub const fn contains(self, event: MonitorEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn with(self, event: MonitorEvent) -> Self {
        EventMask(self.0 | event.bit())
    }

    /// Parse a comma/whitespace-separated list of category names.
    pub fn parse(names: &[String]) -> ConfigResult<Self> {
        let mut mask = EventMask::none();
        for name in names {
            let event = MonitorEvent::from_name(name).ok_or_else(|| {
                ConfigError::invalid_value(format!("unknown event name '{}'", name))
            })?;
            mask = mask.with(event);
        }
        Ok(mask)
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

/// True when a backend's flag change constitutes a transition.
///
/// Maintenance flips never count, and at least one of the two states must
/// be running (a backend that stays down produces no repeated events).
pub fn status_changed(prev: StatusFlags, current: StatusFlags) -> bool {
    let old = prev.masked(StatusFlags::MONITORED_BITS).bits();
    let new = current.masked(StatusFlags::MONITORED_BITS).bits();

    old != new
        && (old | new) & StatusFlags::MAINT == 0
        && (old | new) & StatusFlags::RUNNING == StatusFlags::RUNNING
}

/// Compute the transition category for a backend whose monitored bits
/// changed.
///
/// Returns `None` only if the masked words are equal, which callers are
/// expected to have excluded via [`status_changed`].
pub fn compute_transition(prev: StatusFlags, current: StatusFlags) -> Option<MonitorEvent> {
    let prev = prev.masked(StatusFlags::MONITORED_BITS);
    let current = current.masked(StatusFlags::MONITORED_BITS);

    if prev == current {
        debug_assert!(false, "transition computed on unchanged status");
        return None;
    }

    if !prev.is_running() {
        if current.is_running() {
            return Some(match role_flavor(current) {
                Some(RoleFlavor::Master) => MonitorEvent::MasterUp,
                Some(RoleFlavor::Slave) => MonitorEvent::SlaveUp,
                Some(RoleFlavor::Synced) => MonitorEvent::SyncedUp,
                Some(RoleFlavor::Ndb) => MonitorEvent::NdbUp,
                None => MonitorEvent::ServerUp,
            });
        }
        // Was not running and still is not.
        debug_assert!(false, "down-to-down is not a transition");
        return None;
    }

    if !current.is_running() {
        return Some(match role_flavor(prev) {
            Some(RoleFlavor::Master) => MonitorEvent::MasterDown,
            Some(RoleFlavor::Slave) => MonitorEvent::SlaveDown,
            Some(RoleFlavor::Synced) => MonitorEvent::SyncedDown,
            Some(RoleFlavor::Ndb) => MonitorEvent::NdbDown,
            None => MonitorEvent::ServerDown,
        });
    }

    // Running before and after: the role bits moved.
    let prev_role = prev.role_bits();
    let current_role = current.role_bits();

    if prev_role != 0 && (current_role == 0 || current_role == prev_role) {
        // We knew what the backend was and that knowledge was lost.
        return Some(match role_flavor(prev) {
            Some(RoleFlavor::Master) => MonitorEvent::LostMaster,
            Some(RoleFlavor::Slave) => MonitorEvent::LostSlave,
            Some(RoleFlavor::Synced) => MonitorEvent::LostSynced,
            Some(RoleFlavor::Ndb) => MonitorEvent::LostNdb,
            None => unreachable!("prev_role != 0 guarantees a flavor"),
        });
    }

    if current_role != 0 {
        return Some(match role_flavor(current) {
            Some(RoleFlavor::Master) => MonitorEvent::NewMaster,
            Some(RoleFlavor::Slave) => MonitorEvent::NewSlave,
            Some(RoleFlavor::Synced) => MonitorEvent::NewSynced,
            Some(RoleFlavor::Ndb) => MonitorEvent::NewNdb,
            None => unreachable!("current_role != 0 guarantees a flavor"),
        });
    }

    // Both running, no role bits on either side: nothing in the monitored
    // set can have changed.
    debug_assert!(false, "running-to-running with no role change");
    None
}

enum RoleFlavor {
    Master,
    Slave,
    Synced,
    Ndb,
}

fn role_flavor(flags: StatusFlags) -> Option<RoleFlavor> {
    if flags.contains(StatusFlags::MASTER) {
        Some(RoleFlavor::Master)
    } else if flags.contains(StatusFlags::SLAVE) {
        Some(RoleFlavor::Slave)
    } else if flags.contains(StatusFlags::JOINED) {
        Some(RoleFlavor::Synced)
    } else if flags.contains(StatusFlags::NDB) {
        Some(RoleFlavor::Ndb)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(bits: u64) -> StatusFlags {
        StatusFlags::from_bits(bits)
    }

    #[test]
    fn test_master_down() {
        let prev = flags(StatusFlags::RUNNING | StatusFlags::MASTER);
        let current = flags(0);
        assert!(status_changed(prev, current));
        assert_eq!(
            compute_transition(prev, current),
            Some(MonitorEvent::MasterDown)
        );
    }

    #[test]
    fn test_slave_up() {
        let prev = flags(0);
        let current = flags(StatusFlags::RUNNING | StatusFlags::SLAVE);
        assert_eq!(
            compute_transition(prev, current),
            Some(MonitorEvent::SlaveUp)
        );
    }

    #[test]
    fn test_plain_server_up_and_down() {
        let down = flags(0);
        let up = flags(StatusFlags::RUNNING);
        assert_eq!(compute_transition(down, up), Some(MonitorEvent::ServerUp));
        assert_eq!(compute_transition(up, down), Some(MonitorEvent::ServerDown));
    }

    #[test]
    fn test_lost_master() {
        let prev = flags(StatusFlags::RUNNING | StatusFlags::MASTER);
        let current = flags(StatusFlags::RUNNING);
        assert_eq!(
            compute_transition(prev, current),
            Some(MonitorEvent::LostMaster)
        );
    }

    #[test]
    fn test_new_master_from_plain_running() {
        let prev = flags(StatusFlags::RUNNING);
        let current = flags(StatusFlags::RUNNING | StatusFlags::MASTER);
        assert_eq!(
            compute_transition(prev, current),
            Some(MonitorEvent::NewMaster)
        );
    }

    #[test]
    fn test_promotion_is_new_master() {
        let prev = flags(StatusFlags::RUNNING | StatusFlags::SLAVE);
        let current = flags(StatusFlags::RUNNING | StatusFlags::MASTER);
        assert_eq!(
            compute_transition(prev, current),
            Some(MonitorEvent::NewMaster)
        );
    }

    #[test]
    fn test_maint_flip_is_not_a_transition() {
        let prev = flags(StatusFlags::RUNNING | StatusFlags::SLAVE);
        let current = flags(StatusFlags::RUNNING | StatusFlags::SLAVE | StatusFlags::MAINT);
        assert!(!status_changed(prev, current));
    }

    #[test]
    fn test_non_monitored_bits_are_ignored() {
        let prev = flags(StatusFlags::RUNNING | StatusFlags::SLAVE);
        let current = flags(StatusFlags::RUNNING | StatusFlags::SLAVE | StatusFlags::AUTH_ERROR);
        assert!(!status_changed(prev, current));
    }

    #[test]
    fn test_down_to_down_is_not_a_transition() {
        let prev = flags(0);
        let current = flags(StatusFlags::AUTH_ERROR);
        assert!(!status_changed(prev, current));
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in MonitorEvent::ALL {
            assert_eq!(MonitorEvent::from_name(event.name()), Some(event));
        }
    }

    #[test]
    fn test_mask_parse() {
        let mask = EventMask::parse(&["master_down".to_string(), "new_master".to_string()])
            .unwrap();
        assert!(mask.contains(MonitorEvent::MasterDown));
        assert!(mask.contains(MonitorEvent::NewMaster));
        assert!(!mask.contains(MonitorEvent::SlaveDown));
    }

    #[test]
    fn test_mask_rejects_unknown_name() {
        assert!(EventMask::parse(&["master_gone".to_string()]).is_err());
    }

    #[test]
    fn test_default_mask_contains_everything() {
        let mask = EventMask::default();
        for event in MonitorEvent::ALL {
            assert!(mask.contains(event));
        }
    }
}
