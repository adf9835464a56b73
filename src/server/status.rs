//! Backend role-flag word.
//!
//! A backend's observed role and health is a set of bits packed into one
//! 64-bit word so that it can be published and read atomically. The word
//! carries both monitor-derived state (RUNNING, MASTER, ...) and
//! admin-driven state (MAINT, DRAINING).

use std::fmt;

/// Bit set describing a backend's observed role and health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(u64);

impl StatusFlags {
    /// The backend answered the last probe.
    pub const RUNNING: u64 = 1 << 0;
    /// The backend is the replication master.
    pub const MASTER: u64 = 1 << 1;
    /// The backend is a replication slave.
    pub const SLAVE: u64 = 1 << 2;
    /// The backend is a synced member of a multi-master cluster.
    pub const JOINED: u64 = 1 << 3;
    /// The backend is a cluster data node.
    pub const NDB: u64 = 1 << 4;
    /// Admin has placed the backend in maintenance.
    pub const MAINT: u64 = 1 << 5;
    /// Admin is draining the backend: existing sessions stay, new ones avoid it.
    pub const DRAINING: u64 = 1 << 6;
    /// A monitored disk path crossed its usage threshold.
    pub const DISK_EXHAUSTED: u64 = 1 << 7;
    /// The last probe failed with access-denied.
    pub const AUTH_ERROR: u64 = 1 << 8;
    /// The backend held mastership at some point before going down.
    pub const WAS_MASTER: u64 = 1 << 9;

    /// The bits that describe a replication role.
    pub const ROLE_BITS: u64 = Self::MASTER | Self::SLAVE | Self::JOINED | Self::NDB;

    /// The bits relevant to transition detection. Everything else (drain,
    /// disk, auth, was-master) changes without producing a monitor event.
    pub const MONITORED_BITS: u64 =
        Self::RUNNING | Self::MAINT | Self::MASTER | Self::SLAVE | Self::JOINED | Self::NDB;

    pub const fn empty() -> Self {
        StatusFlags(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        StatusFlags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, bits: u64) -> bool {
        self.0 & bits != 0
    }

    pub const fn with(self, bits: u64) -> Self {
        StatusFlags(self.0 | bits)
    }

    pub const fn without(self, bits: u64) -> Self {
        StatusFlags(self.0 & !bits)
    }

    pub const fn masked(self, mask: u64) -> Self {
        StatusFlags(self.0 & mask)
    }

    pub const fn is_running(self) -> bool {
        self.contains(Self::RUNNING)
    }

    pub const fn is_down(self) -> bool {
        !self.is_running()
    }

    pub const fn is_master(self) -> bool {
        self.contains(Self::MASTER)
    }

    pub const fn is_slave(self) -> bool {
        self.contains(Self::SLAVE)
    }

    pub const fn is_in_maint(self) -> bool {
        self.contains(Self::MAINT)
    }

    pub const fn is_draining(self) -> bool {
        self.contains(Self::DRAINING)
    }

    /// Usable for new work: answering probes and not in maintenance.
    pub const fn is_usable(self) -> bool {
        self.is_running() && !self.is_in_maint()
    }

    /// Part of the cluster in some role.
    pub const fn is_in_cluster(self) -> bool {
        self.contains(Self::ROLE_BITS)
    }

    /// The role bits alone.
    pub const fn role_bits(self) -> u64 {
        self.0 & Self::ROLE_BITS
    }
}

impl fmt::Display for StatusFlags {
    /// Human-readable form, e.g. `Master, Running`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(u64, &str)] = &[
            (StatusFlags::MAINT, "Maintenance"),
            (StatusFlags::DRAINING, "Draining"),
            (StatusFlags::MASTER, "Master"),
            (StatusFlags::SLAVE, "Slave"),
            (StatusFlags::JOINED, "Synced"),
            (StatusFlags::NDB, "NDB"),
            (StatusFlags::AUTH_ERROR, "Auth Error"),
            (StatusFlags::DISK_EXHAUSTED, "Disk Space Exhausted"),
            (StatusFlags::WAS_MASTER, "Was Master"),
            (StatusFlags::RUNNING, "Running"),
        ];

        if self.0 == 0 {
            return f.write_str("Down");
        }

        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(*bit) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        if !self.is_running() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str("Down")?;
        }

        Ok(())
    }
}
