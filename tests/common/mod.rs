//! Shared test doubles: a programmable probe connector and a session
//! connector.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use relaygate::monitor::{
    ConnectionSettings, Connector, DiskSpaceError, DiskSpaceUsage, ProbeConnection, ProbeError,
    RoleInfo,
};
use relaygate::routing::{BackendConnection, RoutingError, RoutingResult, SessionConnector};
use relaygate::server::Backend;

/// Scripted behavior for one backend.
#[derive(Clone, Default)]
pub struct BackendPlan {
    pub reachable: bool,
    pub deny_access: bool,
    pub deny_permission_query: bool,
    pub roles: RoleInfo,
    pub disk_usages: Vec<DiskSpaceUsage>,
    pub disk_unsupported: bool,
}

/// A cluster of scripted backends behind one connector.
#[derive(Clone, Default)]
pub struct MockCluster {
    plans: Arc<Mutex<HashMap<String, BackendPlan>>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            plans: Arc::clone(&self.plans),
        })
    }

    pub fn plan(&self, name: &str) -> BackendPlan {
        self.plans
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_plan(&self, name: &str, plan: BackendPlan) {
        self.plans.lock().unwrap().insert(name.to_string(), plan);
    }

    fn update(&self, name: &str, update: impl FnOnce(&mut BackendPlan)) {
        let mut plans = self.plans.lock().unwrap();
        let plan = plans.entry(name.to_string()).or_default();
        update(plan);
    }

    /// Backend answers probes and reports the master role.
    pub fn set_master(&self, name: &str) {
        self.update(name, |plan| {
            plan.reachable = true;
            plan.roles = RoleInfo {
                master: true,
                ..RoleInfo::default()
            };
        });
    }

    /// Backend answers probes and reports the slave role.
    pub fn set_slave(&self, name: &str) {
        self.update(name, |plan| {
            plan.reachable = true;
            plan.roles = RoleInfo {
                slave: true,
                ..RoleInfo::default()
            };
        });
    }

    /// Backend answers probes with no role.
    pub fn set_running(&self, name: &str) {
        self.update(name, |plan| {
            plan.reachable = true;
            plan.roles = RoleInfo::default();
        });
    }

    /// Backend stops answering probes.
    pub fn set_down(&self, name: &str) {
        self.update(name, |plan| plan.reachable = false);
    }

    /// Backend rejects the probe credentials.
    pub fn set_access_denied(&self, name: &str) {
        self.update(name, |plan| {
            plan.reachable = false;
            plan.deny_access = true;
        });
    }

    pub fn set_disk_usages(&self, name: &str, usages: Vec<DiskSpaceUsage>) {
        self.update(name, |plan| plan.disk_usages = usages);
    }
}

struct MockConnector {
    plans: Arc<Mutex<HashMap<String, BackendPlan>>>,
}

impl Connector for MockConnector {
    fn connect(
        &self,
        backend: &Backend,
        _settings: &ConnectionSettings,
    ) -> Result<Box<dyn ProbeConnection>, ProbeError> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(backend.name())
            .cloned()
            .unwrap_or_default();

        if plan.deny_access {
            return Err(ProbeError::access_denied("access denied for probe user"));
        }
        if !plan.reachable {
            return Err(ProbeError::refused("connection refused"));
        }

        Ok(Box::new(MockProbe {
            backend: backend.name().to_string(),
            plans: Arc::clone(&self.plans),
        }))
    }
}

struct MockProbe {
    backend: String,
    plans: Arc<Mutex<HashMap<String, BackendPlan>>>,
}

impl MockProbe {
    fn plan(&self) -> BackendPlan {
        self.plans
            .lock()
            .unwrap()
            .get(&self.backend)
            .cloned()
            .unwrap_or_default()
    }
}

impl ProbeConnection for MockProbe {
    fn ping(&mut self) -> bool {
        self.plan().reachable
    }

    fn discover_roles(&mut self) -> Result<RoleInfo, ProbeError> {
        Ok(self.plan().roles)
    }

    fn disk_space(&mut self) -> Result<Vec<DiskSpaceUsage>, DiskSpaceError> {
        let plan = self.plan();
        if plan.disk_unsupported {
            return Err(DiskSpaceError::Unsupported(
                "backend does not expose disk information".to_string(),
            ));
        }
        Ok(plan.disk_usages)
    }

    fn check_permissions(&mut self, _query: &str) -> Result<(), ProbeError> {
        if self.plan().deny_permission_query {
            return Err(ProbeError::access_denied("permission query denied"));
        }
        Ok(())
    }
}

/// Session connector that always succeeds, or always fails when told to.
#[derive(Default)]
pub struct MockSessionConnector {
    fail: AtomicBool,
}

impl MockSessionConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }
}

impl SessionConnector for MockSessionConnector {
    fn connect(&self, backend: &Backend) -> RoutingResult<Box<dyn BackendConnection>> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(RoutingError::connect_failed(format!(
                "could not open a connection to '{}'",
                backend.name()
            )));
        }
        Ok(Box::new(NullConnection))
    }
}

/// Connection that swallows every packet.
pub struct NullConnection;

impl BackendConnection for NullConnection {
    fn write(&mut self, _packet: &[u8]) -> RoutingResult<()> {
        Ok(())
    }
}
