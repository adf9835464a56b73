//! Backend registry.
//!
//! Registration and deregistration are serialized by one lock. Lookups
//! hand out `Arc<Backend>` clones; once a caller holds one, role flags
//! and counters are read and written lock-free through the backend's
//! atomics.

use std::sync::{Arc, Mutex};

use super::backend::Backend;
use super::errors::{ServerError, ServerResult};

/// Catalog of all backends known to the process, in configuration order.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Mutex<Vec<Arc<Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Names are unique within the process.
    pub fn register(&self, backend: Backend) -> ServerResult<Arc<Backend>> {
        let mut backends = self.backends.lock().unwrap_or_else(|e| e.into_inner());

        if backends.iter().any(|b| b.name() == backend.name()) {
            return Err(ServerError::duplicate_name(format!(
                "backend '{}' is already registered",
                backend.name()
            )));
        }

        let backend = Arc::new(backend);
        backends.push(Arc::clone(&backend));
        Ok(backend)
    }

    /// Remove a backend by name and return it.
    pub fn deregister(&self, name: &str) -> ServerResult<Arc<Backend>> {
        let mut backends = self.backends.lock().unwrap_or_else(|e| e.into_inner());

        match backends.iter().position(|b| b.name() == name) {
            Some(index) => Ok(backends.remove(index)),
            None => Err(ServerError::unknown_backend(format!(
                "backend '{}' is not registered",
                name
            ))),
        }
    }

    /// Look up a backend by name.
    pub fn find(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|b| b.name() == name)
            .map(Arc::clone)
    }

    /// Ordered snapshot of all backends. Callers iterate the snapshot
    /// without holding the registry lock.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.backends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_find() {
        let registry = BackendRegistry::new();
        registry
            .register(Backend::new("db-1", "10.0.0.1", 3306, 1))
            .unwrap();

        let found = registry.find("db-1").unwrap();
        assert_eq!(found.address(), "10.0.0.1");
        assert!(registry.find("db-2").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = BackendRegistry::new();
        registry
            .register(Backend::new("db-1", "10.0.0.1", 3306, 1))
            .unwrap();

        let err = registry
            .register(Backend::new("db-1", "10.0.0.2", 3306, 1))
            .unwrap_err();
        assert_eq!(err.kind, crate::server::ServerErrorKind::DuplicateName);
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let registry = BackendRegistry::new();
        for name in ["db-1", "db-2", "db-3"] {
            registry
                .register(Backend::new(name, "10.0.0.1", 3306, 1))
                .unwrap();
        }

        let names: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["db-1", "db-2", "db-3"]);
    }

    #[test]
    fn test_deregister_removes() {
        let registry = BackendRegistry::new();
        registry
            .register(Backend::new("db-1", "10.0.0.1", 3306, 1))
            .unwrap();

        registry.deregister("db-1").unwrap();
        assert!(registry.is_empty());
        assert!(registry.deregister("db-1").is_err());
    }

    #[test]
    fn test_counters_visible_through_shared_handle() {
        let registry = BackendRegistry::new();
        let registered = registry
            .register(Backend::new("db-1", "10.0.0.1", 3306, 1))
            .unwrap();

        registered.add_connection();
        let found = registry.find("db-1").unwrap();
        assert_eq!(found.connections(), 1);
    }
}
