//! Backend identity and mutable state.
//!
//! A `Backend` is shared between the monitor (writes role flags), the
//! router (reads flags, bumps connection counters), and the event-hook
//! renderer (reads topology fields). Everything mutable is either an
//! atomic word or sits behind its own small mutex; readers never block
//! flag writers.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::status::StatusFlags;
use crate::config::DiskSpaceLimits;

/// Probe credentials, either monitor-wide or a per-backend override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// The last transition the monitor observed on a backend.
///
/// Kept so that a standby proxy promoted to active can decide whether a
/// failover script is still owed for a master that went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Symbolic transition name, e.g. `master_down`
    pub event: String,
    /// Wall-clock time the transition was detected
    pub at: DateTime<Utc>,
}

/// A database server the proxy can route to.
#[derive(Debug)]
pub struct Backend {
    name: String,
    address: String,
    port: u16,
    weight: u64,

    status: AtomicU64,
    connections: AtomicU64,
    total_connections: AtomicU64,
    packets: AtomicU64,

    // Replication topology discovered by the monitor; -1 = unknown.
    node_id: AtomicI64,
    master_id: AtomicI64,

    last_event: Mutex<Option<TransitionRecord>>,
    probe_credentials: Mutex<Option<Credentials>>,
    disk_space_limits: Mutex<Option<DiskSpaceLimits>>,
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        weight: u64,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            weight,
            status: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            packets: AtomicU64::new(0),
            node_id: AtomicI64::new(-1),
            master_id: AtomicI64::new(-1),
            last_event: Mutex::new(None),
            probe_credentials: Mutex::new(None),
            disk_space_limits: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// `[address]:port`, the form used in logs and hook tokens.
    pub fn endpoint(&self) -> String {
        format!("[{}]:{}", self.address, self.port)
    }

    // ---- status word -------------------------------------------------

    /// Current published role flags.
    pub fn status(&self) -> StatusFlags {
        StatusFlags::from_bits(self.status.load(Ordering::Acquire))
    }

    /// Replace the whole flag word. This is the monitor's publish step.
    pub fn store_status(&self, flags: StatusFlags) {
        self.status.store(flags.bits(), Ordering::Release);
    }

    /// Set bits in the published word. Used for direct admin changes on a
    /// backend whose monitor is stopped.
    pub fn set_status_bits(&self, bits: u64) {
        self.status.fetch_or(bits, Ordering::AcqRel);
    }

    /// Clear bits in the published word.
    pub fn clear_status_bits(&self, bits: u64) {
        self.status.fetch_and(!bits, Ordering::AcqRel);
    }

    // ---- session counters --------------------------------------------

    /// Active sessions bound to this backend.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Lifetime sessions since process start.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Count a new session. Returns the new active count.
    pub fn add_connection(&self) -> u64 {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a closed session.
    pub fn remove_connection(&self) {
        let previous = self.connections.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "connection counter underflow");
    }

    /// Packets routed to this backend. Inexact under concurrent streaming.
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn add_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    // ---- replication topology ----------------------------------------

    pub fn node_id(&self) -> i64 {
        self.node_id.load(Ordering::Relaxed)
    }

    pub fn set_node_id(&self, id: i64) {
        self.node_id.store(id, Ordering::Relaxed);
    }

    pub fn master_id(&self) -> i64 {
        self.master_id.load(Ordering::Relaxed)
    }

    pub fn set_master_id(&self, id: i64) {
        self.master_id.store(id, Ordering::Relaxed);
    }

    // ---- transition record -------------------------------------------

    pub fn record_event(&self, event: impl Into<String>, at: DateTime<Utc>) {
        let mut slot = self.last_event.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(TransitionRecord {
            event: event.into(),
            at,
        });
    }

    pub fn last_event(&self) -> Option<TransitionRecord> {
        self.last_event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ---- overrides ---------------------------------------------------

    /// Per-backend probe credential override, if configured.
    pub fn probe_credentials(&self) -> Option<Credentials> {
        self.probe_credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_probe_credentials(&self, credentials: Option<Credentials>) {
        let mut slot = self
            .probe_credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = credentials;
    }

    /// Per-backend disk-space limits; take precedence over the monitor's.
    pub fn disk_space_limits(&self) -> Option<DiskSpaceLimits> {
        self.disk_space_limits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_disk_space_limits(&self, limits: Option<DiskSpaceLimits>) {
        let mut slot = self
            .disk_space_limits
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = limits;
    }

    /// Operator-facing snapshot of this backend.
    pub fn diagnostics(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "address": self.address,
            "port": self.port,
            "weight": self.weight,
            "status": self.status().to_string(),
            "connections": self.connections(),
            "total_connections": self.total_connections(),
            "packets": self.packets(),
            "last_event": self.last_event().map(|e| e.event),
        })
    }
}
