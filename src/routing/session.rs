//! Client sessions and the session registry.
//!
//! A session holds exactly one backend for its whole life. The chosen
//! backend's connection counter is incremented once when the session is
//! created and decremented once when it closes, no matter how many code
//! paths race to close it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use uuid::Uuid;

use crate::monitor::HangupHandler;
use crate::observability::Logger;
use crate::server::Backend;

use super::errors::{RoutingError, RoutingResult};

/// An open connection to a backend, owned by one session.
pub trait BackendConnection: Send {
    fn write(&mut self, packet: &[u8]) -> RoutingResult<()>;
}

/// Opens backend connections for new sessions. Implemented outside this
/// crate for real protocols and by mocks in tests.
pub trait SessionConnector: Send + Sync {
    fn connect(&self, backend: &Backend) -> RoutingResult<Box<dyn BackendConnection>>;
}

/// One client session bound to one backend.
pub struct RouterSession {
    id: Uuid,
    backend: Arc<Backend>,
    /// Role filter the session was created with. `value` may be wider
    /// than the router's if the session fell back to the root master.
    mask: u64,
    value: u64,
    closed: AtomicBool,
    conn: Mutex<Option<Box<dyn BackendConnection>>>,
}

impl std::fmt::Debug for RouterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSession")
            .field("id", &self.id)
            .field("mask", &self.mask)
            .field("value", &self.value)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RouterSession {
    pub(crate) fn new(
        backend: Arc<Backend>,
        mask: u64,
        value: u64,
        conn: Box<dyn BackendConnection>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            mask,
            value,
            closed: AtomicBool::new(false),
            conn: Mutex::new(Some(conn)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write one packet on the session's backend connection.
    pub(crate) fn write(&self, packet: &[u8]) -> RoutingResult<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        match conn.as_mut() {
            Some(conn) => conn.write(packet),
            None => Err(RoutingError::session_invalid("session is closed")),
        }
    }

    /// Close the session. The connection counter is decremented exactly
    /// once; later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backend.remove_connection();
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Drop for RouterSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registry of live sessions keyed by session id.
///
/// The monitor's force-disconnect step arrives here: sessions bound to a
/// backend that became unusable are closed, and the next packet the
/// client routes fails with a "session is closed" diagnostic.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Weak<RouterSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: &Arc<RouterSession>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session.id(), Arc::downgrade(session));
    }

    pub fn remove(&self, id: Uuid) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&id);
    }

    /// Live sessions currently bound to the named backend.
    pub fn sessions_for(&self, backend_name: &str) -> Vec<Arc<RouterSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut bound = Vec::new();
        sessions.retain(|_, weak| match weak.upgrade() {
            Some(session) => {
                if session.backend().name() == backend_name {
                    bound.push(session);
                }
                true
            }
            None => false,
        });
        bound
    }

    pub fn len(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, weak| weak.strong_count() > 0);
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HangupHandler for SessionRegistry {
    fn hangup_backend(&self, backend_name: &str) {
        let bound = self.sessions_for(backend_name);
        if bound.is_empty() {
            return;
        }

        Logger::info(
            "SESSIONS_HUNG_UP",
            &[
                ("backend", backend_name),
                ("count", &bound.len().to_string()),
            ],
        );
        for session in bound {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullConnection;

    impl BackendConnection for NullConnection {
        fn write(&mut self, _packet: &[u8]) -> RoutingResult<()> {
            Ok(())
        }
    }

    fn session(backend: &Arc<Backend>) -> Arc<RouterSession> {
        backend.add_connection();
        Arc::new(RouterSession::new(
            Arc::clone(backend),
            crate::server::StatusFlags::RUNNING,
            crate::server::StatusFlags::RUNNING,
            Box::new(NullConnection),
        ))
    }

    #[test]
    fn test_close_decrements_once() {
        let backend = Arc::new(Backend::new("db-1", "10.0.0.1", 3306, 1));
        let s = session(&backend);
        assert_eq!(backend.connections(), 1);

        s.close();
        s.close();
        assert_eq!(backend.connections(), 0);
    }

    #[test]
    fn test_drop_closes() {
        let backend = Arc::new(Backend::new("db-1", "10.0.0.1", 3306, 1));
        {
            let _s = session(&backend);
            assert_eq!(backend.connections(), 1);
        }
        assert_eq!(backend.connections(), 0);
    }

    #[test]
    fn test_write_after_close_fails() {
        let backend = Arc::new(Backend::new("db-1", "10.0.0.1", 3306, 1));
        let s = session(&backend);
        s.close();
        assert!(s.write(b"select 1").is_err());
    }

    #[test]
    fn test_registry_hangup_targets_one_backend() {
        let db1 = Arc::new(Backend::new("db-1", "10.0.0.1", 3306, 1));
        let db2 = Arc::new(Backend::new("db-2", "10.0.0.2", 3306, 1));

        let registry = SessionRegistry::new();
        let s1 = session(&db1);
        let s2 = session(&db2);
        registry.register(&s1);
        registry.register(&s2);

        registry.hangup_backend("db-1");
        assert!(s1.is_closed());
        assert!(!s2.is_closed());
        assert_eq!(db1.connections(), 0);
        assert_eq!(db2.connections(), 1);
    }

    #[test]
    fn test_registry_drops_dead_sessions() {
        let backend = Arc::new(Backend::new("db-1", "10.0.0.1", 3306, 1));
        let registry = SessionRegistry::new();
        {
            let s = session(&backend);
            registry.register(&s);
            assert_eq!(registry.len(), 1);
        }
        assert_eq!(registry.len(), 0);
    }
}
