//! The per-(monitor, backend) binding.
//!
//! Admin threads and the monitor worker share a `MonitoredBackend`
//! through an `Arc`. The admin side touches exactly one field, the
//! request slot, with an atomic swap. Everything else is probe state the
//! worker alone reads and writes, behind an uncontended mutex.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::server::{Backend, StatusFlags};

use super::probe::ProbeConnection;

/// Sentinel for `disk_space_checked`: disk checking is disabled on this
/// backend (the probe reported the capability is missing).
pub const DISK_CHECK_DISABLED: i64 = -1;

/// Admin request for one backend, staged until the next tick start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AdminRequest {
    None = 0,
    MaintOn = 1,
    MaintOff = 2,
    DrainOn = 3,
    DrainOff = 4,
}

impl AdminRequest {
    fn from_i32(raw: i32) -> AdminRequest {
        match raw {
            1 => AdminRequest::MaintOn,
            2 => AdminRequest::MaintOff,
            3 => AdminRequest::DrainOn,
            4 => AdminRequest::DrainOff,
            _ => AdminRequest::None,
        }
    }
}

/// Worker-private probe state for one backend.
pub struct ProbeState {
    /// Open probe connection; `None` between failed ticks
    pub conn: Option<Box<dyn ProbeConnection>>,
    /// Published flags at the start of the current tick
    pub prev_status: StatusFlags,
    /// Flags staged during the current tick, published at tick end
    pub pending_status: StatusFlags,
    /// Consecutive probe failures; gates the connect-error log line
    pub err_count: u64,
    /// Monotonic ms timestamp of the last disk check, or
    /// [`DISK_CHECK_DISABLED`]
    pub disk_space_checked: i64,
}

/// One backend as seen by one monitor.
pub struct MonitoredBackend {
    backend: Arc<Backend>,
    state: Mutex<ProbeState>,
    status_request: AtomicI32,
}

impl MonitoredBackend {
    pub fn new(backend: Arc<Backend>, now_ms: i64) -> Self {
        Self {
            backend,
            state: Mutex::new(ProbeState {
                conn: None,
                prev_status: StatusFlags::empty(),
                pending_status: StatusFlags::empty(),
                err_count: 0,
                // Pretend disk space was just checked so the first check
                // waits a full interval.
                disk_space_checked: now_ms,
            }),
            status_request: AtomicI32::new(AdminRequest::None as i32),
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Lock the worker-private probe state.
    pub fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stage an admin request. Returns the overwritten request so the
    /// caller can warn when the previous one was never read.
    pub fn stage_request(&self, request: AdminRequest) -> AdminRequest {
        AdminRequest::from_i32(self.status_request.swap(request as i32, Ordering::AcqRel))
    }

    /// Take and clear the staged request. Called once at tick start.
    pub fn take_request(&self) -> AdminRequest {
        AdminRequest::from_i32(
            self.status_request
                .swap(AdminRequest::None as i32, Ordering::AcqRel),
        )
    }

    /// Drop the probe connection, if any. Used on stop.
    pub fn close_connection(&self) {
        self.state().conn = None;
    }
}
