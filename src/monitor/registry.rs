//! Admin control plane: the process-wide monitor list.
//!
//! All lifecycle operations flow through this registry, serialized by a
//! single lock. The lock is never held across a monitor tick; it guards
//! only list access.

use std::sync::{Arc, Mutex};

use super::engine::{Monitor, MonitorState};

/// Thread-safe list of monitors, in configuration order.
#[derive(Default)]
pub struct MonitorRegistry {
    monitors: Mutex<Vec<Arc<Monitor>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `apply` on every monitor. Iteration stops when `apply`
    /// returns false.
    pub fn for_each(&self, mut apply: impl FnMut(&Arc<Monitor>) -> bool) {
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        for monitor in monitors.iter() {
            if !apply(monitor) {
                break;
            }
        }
    }

    /// Insert a monitor at the front of the list.
    pub fn insert_front(&self, monitor: Arc<Monitor>) {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.insert(0, monitor);
    }

    /// Clear the list and return the previous contents. Every returned
    /// monitor must already be stopped.
    pub fn clear_and_return(&self) -> Vec<Arc<Monitor>> {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        let drained = std::mem::take(&mut *monitors);
        for monitor in &drained {
            debug_assert!(
                monitor.state() == MonitorState::Stopped,
                "monitor '{}' cleared from the registry while running",
                monitor.name()
            );
        }
        drained
    }

    /// Run a closure while holding the list lock, for callers that need a
    /// consistent view across a multi-step operation.
    pub fn run_under_lock(&self, apply: impl FnOnce()) {
        let _monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        apply();
    }

    /// Find a monitor by name.
    pub fn find(&self, name: &str) -> Option<Arc<Monitor>> {
        let mut found = None;
        self.for_each(|monitor| {
            if monitor.name() == name {
                found = Some(Arc::clone(monitor));
            }
            found.is_none()
        });
        found
    }

    pub fn len(&self) -> usize {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        for monitor in monitors.iter() {
            debug_assert!(
                monitor.state() == MonitorState::Stopped,
                "monitor '{}' still running at registry destruction",
                monitor.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::engine::SimpleModule;
    use crate::monitor::probe::{ConnectionSettings, Connector, ProbeConnection, ProbeError};
    use crate::observability::MetricsRegistry;
    use crate::server::Backend;
    use tempfile::TempDir;

    struct NeverConnector;

    impl Connector for NeverConnector {
        fn connect(
            &self,
            _backend: &Backend,
            _settings: &ConnectionSettings,
        ) -> Result<Box<dyn ProbeConnection>, ProbeError> {
            Err(ProbeError::refused("test connector"))
        }
    }

    fn monitor(name: &str, dir: &TempDir) -> Arc<Monitor> {
        Arc::new(Monitor::new(
            name,
            Box::new(SimpleModule),
            Arc::new(NeverConnector),
            dir.path(),
            Arc::new(MetricsRegistry::new()),
        ))
    }

    #[test]
    fn test_insert_front_orders_latest_first() {
        let tmp = TempDir::new().unwrap();
        let registry = MonitorRegistry::new();
        registry.insert_front(monitor("first", &tmp));
        registry.insert_front(monitor("second", &tmp));

        let mut names = Vec::new();
        registry.for_each(|m| {
            names.push(m.name().to_string());
            true
        });
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_for_each_stops_on_false() {
        let tmp = TempDir::new().unwrap();
        let registry = MonitorRegistry::new();
        registry.insert_front(monitor("a", &tmp));
        registry.insert_front(monitor("b", &tmp));

        let mut visited = 0;
        registry.for_each(|_| {
            visited += 1;
            false
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_find() {
        let tmp = TempDir::new().unwrap();
        let registry = MonitorRegistry::new();
        registry.insert_front(monitor("cluster-mon", &tmp));

        assert!(registry.find("cluster-mon").is_some());
        assert!(registry.find("other").is_none());
    }

    #[test]
    fn test_clear_and_return() {
        let tmp = TempDir::new().unwrap();
        let registry = MonitorRegistry::new();
        registry.insert_front(monitor("cluster-mon", &tmp));

        let drained = registry.clear_and_return();
        assert_eq!(drained.len(), 1);
        assert!(registry.is_empty());
    }
}
