//! Connection-based router.
//!
//! Load balancing happens once, when a session is created: the router
//! picks the backend minimising `(connections + 1) * 1000 / weight`
//! among the backends that satisfy its role filter, and the session
//! sticks to that backend until it ends. Before each routed packet the
//! binding is re-validated against the monitor-maintained flags.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::{Logger, MetricsRegistry};
use crate::server::{Backend, BackendRegistry, StatusFlags};

use super::config::{parse_router_options, RoleFilter};
use super::errors::{RoutingError, RoutingResult};
use super::session::{RouterSession, SessionConnector, SessionRegistry};

/// A router instance for one service.
pub struct Router {
    service: String,
    backends: Arc<BackendRegistry>,
    connector: Arc<dyn SessionConnector>,
    sessions: Arc<SessionRegistry>,
    metrics: Arc<MetricsRegistry>,
    /// Packed (mask, value) filter; swapped whole on reconfiguration.
    filter: AtomicU64,
}

impl Router {
    pub fn new(
        service: impl Into<String>,
        backends: Arc<BackendRegistry>,
        connector: Arc<dyn SessionConnector>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            service: service.into(),
            backends,
            connector,
            sessions: Arc::new(SessionRegistry::new()),
            metrics,
            filter: AtomicU64::new(RoleFilter::running().packed()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// The session registry, to be handed to monitors as the hangup
    /// target.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Compile and install `router_options` tokens. Safe on a live
    /// router; existing sessions keep the filter they were created with.
    pub fn configure(&self, options: &[String]) -> RoutingResult<()> {
        let filter = parse_router_options(options)?;
        self.filter.store(filter.packed(), Ordering::Release);
        Ok(())
    }

    pub fn filter(&self) -> RoleFilter {
        RoleFilter::from_packed(self.filter.load(Ordering::Acquire))
    }

    /// The root master: the highest-weighted usable backend flagged
    /// MASTER. Ties keep the earlier backend in registry order.
    pub fn root_master(&self) -> Option<Arc<Backend>> {
        let mut master: Option<Arc<Backend>> = None;
        for backend in self.backends.snapshot() {
            let status = backend.status();
            if !status.is_usable() || !status.is_master() {
                continue;
            }
            match &master {
                Some(current) if backend.weight() <= current.weight() => {}
                _ => master = Some(backend),
            }
        }
        master
    }

    /// Bind a new client session to one backend.
    pub fn new_session(&self) -> RoutingResult<Arc<RouterSession>> {
        let filter = self.filter();
        let master_host = self.root_master();

        match self.select_backend(&filter, master_host.as_ref()) {
            Some((candidate, effective_value)) => {
                let conn = self.connector.connect(&candidate).map_err(|e| {
                    self.metrics.increment_sessions_failed();
                    Logger::error(
                        "SESSION_CONNECT_FAILED",
                        &[
                            ("backend", candidate.name()),
                            ("error", &e.to_string()),
                            ("service", &self.service),
                        ],
                    );
                    e
                })?;

                candidate.add_connection();
                let session = Arc::new(RouterSession::new(
                    Arc::clone(&candidate),
                    filter.mask,
                    effective_value,
                    conn,
                ));
                self.sessions.register(&session);
                self.metrics.increment_sessions_created();

                Logger::info(
                    "SESSION_CREATED",
                    &[
                        ("backend", candidate.name()),
                        ("connections", &candidate.connections().to_string()),
                        ("service", &self.service),
                    ],
                );
                Ok(session)
            }
            None => {
                self.metrics.increment_sessions_failed();
                let err = RoutingError::no_eligible_backend(format!(
                    "service '{}' found no eligible candidate backend",
                    self.service
                ));
                Logger::error(
                    "SESSION_NO_CANDIDATE",
                    &[("error", &err.message), ("service", &self.service)],
                );
                Err(err)
            }
        }
    }

    /// The selection algorithm. Returns the winning backend and the
    /// session's effective filter value, widened with MASTER when the
    /// session fell back to the root master.
    fn select_backend(
        &self,
        filter: &RoleFilter,
        master_host: Option<&Arc<Backend>>,
    ) -> Option<(Arc<Backend>, u64)> {
        let mut candidate: Option<Arc<Backend>> = None;

        for backend in self.backends.snapshot() {
            let status = backend.status();
            if status.is_in_maint() || status.is_draining() {
                continue;
            }
            if !filter.matches(status) {
                continue;
            }

            match master_host {
                Some(master) => {
                    if Arc::ptr_eq(&backend, master)
                        && filter.value & (StatusFlags::MASTER | StatusFlags::SLAVE)
                            == StatusFlags::SLAVE
                    {
                        // The root master is never used as a slave, even
                        // if it replicates from an external upstream.
                        continue;
                    }
                    if Arc::ptr_eq(&backend, master) && filter.value == StatusFlags::MASTER {
                        // A master-only filter takes exactly the root
                        // master; intermediate masters are never picked.
                        return Some((Arc::clone(master), filter.value));
                    }
                }
                None => {
                    if filter.value == StatusFlags::MASTER {
                        // No master in the cluster: a master-only filter
                        // has no candidate at all.
                        return None;
                    }
                }
            }

            candidate = Some(match candidate {
                None => backend,
                Some(current) => Self::least_loaded(current, backend),
            });
        }

        match candidate {
            Some(candidate) => Some((candidate, filter.value)),
            None => master_host.map(|master| {
                // No eligible backend, but the cluster has a master: use
                // it, and widen the session's value so validity checks
                // accept the master for the session's lifetime.
                let mut value = filter.value;
                if value & StatusFlags::SLAVE != 0 {
                    value |= StatusFlags::MASTER;
                }
                (Arc::clone(master), value)
            }),
        }
    }

    /// Weighted least-connections comparison of two candidates.
    fn least_loaded(current: Arc<Backend>, challenger: Arc<Backend>) -> Arc<Backend> {
        // A weight of zero parks the backend: it loses to any weighted
        // candidate and only wins among the equally parked by load.
        if challenger.weight() == 0 || current.weight() == 0 {
            if challenger.weight() != current.weight() {
                return if challenger.weight() != 0 {
                    challenger
                } else {
                    current
                };
            }
            return if challenger.total_connections() < current.total_connections() {
                challenger
            } else {
                current
            };
        }

        let challenger_score = (challenger.connections() + 1) * 1000 / challenger.weight();
        let current_score = (current.connections() + 1) * 1000 / current.weight();

        if challenger_score < current_score {
            challenger
        } else if challenger_score == current_score
            && challenger.total_connections() < current.total_connections()
        {
            challenger
        } else {
            current
        }
    }

    /// Validity of a session's binding at packet-routing time.
    ///
    /// The role test is a subset check, not the selection-time equality:
    /// a session that fell back to the root master carries a widened
    /// value and must keep accepting the master.
    fn connection_is_valid(&self, session: &RouterSession) -> bool {
        let backend = session.backend();
        let status = backend.status();

        if !status.is_running()
            || status.bits() & session.mask() & session.value() == 0
        {
            return false;
        }

        let active = self
            .backends
            .find(backend.name())
            .map(|b| Arc::ptr_eq(&b, backend))
            .unwrap_or(false);

        if session.value() == StatusFlags::MASTER && active {
            // A master-bound session is valid only while its backend is
            // still the root master.
            return self
                .root_master()
                .map(|master| Arc::ptr_eq(&master, backend))
                .unwrap_or(false);
        }

        // A deregistered backend drains gracefully: the session stays
        // valid and terminates on its own.
        true
    }

    /// Route one client packet over the session's binding.
    pub fn route_packet(&self, session: &RouterSession, packet: &[u8]) -> RoutingResult<()> {
        let backend = session.backend();
        backend.add_packet();

        let reason = if session.is_closed() {
            Some("session is closed".to_string())
        } else if !self.connection_is_valid(session) {
            let status = backend.status();
            Some(if status.is_down() {
                format!("backend '{}' is down", backend.name())
            } else if status.is_in_maint() {
                format!("backend '{}' is in maintenance", backend.name())
            } else {
                format!(
                    "backend '{}' no longer qualifies as a target",
                    backend.name()
                )
            })
        } else {
            None
        };

        if let Some(reason) = reason {
            self.metrics.increment_packets_dropped();
            Logger::error(
                "ROUTE_PACKET_DROPPED",
                &[
                    ("backend", backend.name()),
                    ("reason", &reason),
                    ("service", &self.service),
                ],
            );
            self.close_session(session);
            return Err(RoutingError::session_invalid(reason));
        }

        match session.write(packet) {
            Ok(()) => {
                self.metrics.increment_packets_routed();
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_packets_dropped();
                Logger::error(
                    "ROUTE_WRITE_FAILED",
                    &[
                        ("backend", backend.name()),
                        ("error", &e.to_string()),
                        ("service", &self.service),
                    ],
                );
                self.close_session(session);
                Err(RoutingError::write_failed(e.to_string()))
            }
        }
    }

    /// End a session: counter decremented exactly once, registry entry
    /// dropped.
    pub fn close_session(&self, session: &RouterSession) {
        session.close();
        self.sessions.remove(session.id());
    }

    /// Operator-facing router state.
    pub fn diagnostics(&self) -> serde_json::Value {
        let filter = self.filter();
        serde_json::json!({
            "service": self.service,
            "sessions": self.sessions.len(),
            "filter_mask": filter.mask,
            "filter_value": filter.value,
            "root_master": self.root_master().map(|b| b.name().to_string()),
            "backends": self
                .backends
                .snapshot()
                .iter()
                .map(|b| b.diagnostics())
                .collect::<Vec<_>>(),
        })
    }
}
