//! Monitor engine.
//!
//! One `Monitor` owns one worker thread that executes the sampling loop
//! for its backends. A tick runs in a fixed order:
//!
//! 1. drain staged admin requests
//! 2. probe every non-maintenance backend
//! 3. derive pending flags (health, roles, disk space)
//! 4. publish pending flags atomically
//! 5. detect transitions, log them, dispatch event hooks
//! 6. hang up sessions on backends that became unusable
//! 7. journal the published state
//! 8. advance the tick counter and sleep
//!
//! Everything published in a tick is visible before the tick counter
//! advances; `wait_for_tick` is therefore a synchronization point for
//! admin callers and tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::Parameters;
use crate::observability::{Logger, MetricsRegistry};
use crate::server::{Backend, BackendRegistry, StatusFlags};

use super::disk;
use super::errors::{MonitorError, MonitorResult};
use super::events::{self, MonitorEvent};
use super::journal::{Journal, JournalContents, JournalEntry};
use super::monitored::{AdminRequest, MonitoredBackend, DISK_CHECK_DISABLED};
use super::probe::{ping_or_connect, ConnectOutcome, Connector, DiskSpaceError, ProbeConnection, ProbeErrorKind};
use super::script::{render_command, EventHookRunner, HookContext, HookJob};
use super::settings::MonitorSettings;

const WRN_REQUEST_OVERWRITTEN: &str =
    "previous maintenance request was not yet read by the monitor and was overwritten";

/// Minimum sleep slice; bounds how long an admin request can wait.
const BASE_SLEEP: Duration = Duration::from_millis(100);

/// Monitor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Seam to the session layer: the monitor asks it to hang up client
/// sessions bound to a backend that became unusable.
pub trait HangupHandler: Send + Sync {
    fn hangup_backend(&self, backend_name: &str);
}

/// A probing strategy. The engine owns the canonical loop and calls into
/// the module for the parts that differ between backend kinds.
pub trait MonitorModule: Send {
    /// Module tag, e.g. `simple`.
    fn name(&self) -> &'static str;

    /// Module-specific settings. Called while the monitor is stopped.
    fn configure(&mut self, _params: &Parameters) -> MonitorResult<()> {
        Ok(())
    }

    /// Query run by the start-time permission probe.
    fn permissions_query(&self) -> &str;

    fn pre_tick(&mut self) {}

    fn post_tick(&mut self) {}

    /// Derive role bits for one backend that answered its probe.
    fn update_backend(
        &mut self,
        conn: &mut dyn ProbeConnection,
        backend: &Backend,
        pending: &mut StatusFlags,
    );

    /// Module-specific condition requesting an immediate tick.
    fn immediate_tick_required(&self) -> bool {
        false
    }

    fn diagnostics(&self) -> serde_json::Value {
        serde_json::json!({})
    }
}

/// The default probing strategy: role discovery straight from the probe
/// connection.
pub struct SimpleModule;

impl MonitorModule for SimpleModule {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn permissions_query(&self) -> &str {
        "SELECT 1"
    }

    fn update_backend(
        &mut self,
        conn: &mut dyn ProbeConnection,
        backend: &Backend,
        pending: &mut StatusFlags,
    ) {
        match conn.discover_roles() {
            Ok(info) => {
                backend.set_node_id(info.node_id);
                backend.set_master_id(info.master_id);

                let mut flags = pending.without(StatusFlags::ROLE_BITS).with(info.role_bits());
                if info.master {
                    flags = flags.with(StatusFlags::WAS_MASTER);
                }
                *pending = flags;
            }
            Err(e) => {
                Logger::error(
                    "ROLE_DISCOVERY_FAILED",
                    &[
                        ("backend", backend.name()),
                        ("endpoint", &backend.endpoint()),
                        ("error", &e.to_string()),
                    ],
                );
                *pending = pending.without(StatusFlags::ROLE_BITS);
            }
        }
    }
}

struct Lifecycle {
    state: MonitorState,
    worker: Option<JoinHandle<()>>,
    /// Permission probe has passed once for this monitor.
    checked: bool,
}

/// A monitor instance: settings, membership, worker, journal.
pub struct Monitor {
    name: String,
    module: Mutex<Box<dyn MonitorModule>>,
    connector: Arc<dyn Connector>,
    metrics: Arc<MetricsRegistry>,

    lifecycle: Mutex<Lifecycle>,
    settings: Mutex<MonitorSettings>,
    servers: Mutex<Vec<Arc<MonitoredBackend>>>,
    master: Mutex<Option<String>>,
    journal: Mutex<Journal>,
    hangup: Mutex<Option<Arc<dyn HangupHandler>>>,
    hook_runner: Mutex<Option<EventHookRunner>>,
    unknown_tokens: Mutex<HashSet<String>>,

    running: AtomicBool,
    check_requests: AtomicBool,
    ticks: AtomicU64,

    sleep_lock: Mutex<()>,
    sleep_cv: Condvar,
    tick_lock: Mutex<()>,
    tick_cv: Condvar,

    epoch: Instant,
}

impl Monitor {
    pub fn new(
        name: impl Into<String>,
        module: Box<dyn MonitorModule>,
        connector: Arc<dyn Connector>,
        data_dir: &Path,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let name = name.into();
        let journal = Journal::new(data_dir, &name);
        Self {
            name,
            module: Mutex::new(module),
            connector,
            metrics,
            lifecycle: Mutex::new(Lifecycle {
                state: MonitorState::Stopped,
                worker: None,
                checked: false,
            }),
            settings: Mutex::new(MonitorSettings::default()),
            servers: Mutex::new(Vec::new()),
            master: Mutex::new(None),
            journal: Mutex::new(journal),
            hangup: Mutex::new(None),
            hook_runner: Mutex::new(None),
            unknown_tokens: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            check_requests: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            sleep_lock: Mutex::new(()),
            sleep_cv: Condvar::new(),
            tick_lock: Mutex::new(()),
            tick_cv: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_name(&self) -> &'static str {
        self.module.lock().unwrap_or_else(|e| e.into_inner()).name()
    }

    pub fn state(&self) -> MonitorState {
        self.lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state
    }

    /// Completed ticks. A reader that observes tick N sees all state
    /// published in tick N and earlier.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Name of the current root master, if the monitor knows one.
    pub fn master(&self) -> Option<String> {
        self.master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Connect the monitor to the session layer for force-disconnects.
    pub fn set_hangup_handler(&self, handler: Arc<dyn HangupHandler>) {
        *self.hangup.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    // ---- configuration -----------------------------------------------

    /// Apply settings and resolve the backend list. Valid only while
    /// stopped.
    pub fn configure(
        &self,
        params: &Parameters,
        registry: &BackendRegistry,
    ) -> MonitorResult<()> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.state != MonitorState::Stopped {
            return Err(MonitorError::not_stopped(format!(
                "monitor '{}' must be stopped to be configured",
                self.name
            )));
        }

        let settings = MonitorSettings::from_parameters(params)?;

        let mut resolved = Vec::with_capacity(settings.servers.len());
        for server_name in &settings.servers {
            let backend = registry.find(server_name).ok_or_else(|| {
                MonitorError::invalid_settings(format!(
                    "monitor '{}' references unknown backend '{}'",
                    self.name, server_name
                ))
            })?;
            resolved.push(Arc::new(MonitoredBackend::new(backend, self.now_ms())));
        }

        self.module
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .configure(params)?;

        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
        *self.servers.lock().unwrap_or_else(|e| e.into_inner()) = resolved;
        Ok(())
    }

    /// Add a backend to a stopped monitor.
    pub fn add_backend(&self, backend: Arc<Backend>) -> MonitorResult<()> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.state != MonitorState::Stopped {
            return Err(MonitorError::not_stopped(format!(
                "monitor '{}' must be stopped to change membership",
                self.name
            )));
        }

        let mut servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        if servers.iter().any(|mb| mb.backend().name() == backend.name()) {
            return Err(MonitorError::invalid_settings(format!(
                "backend '{}' is already monitored by '{}'",
                backend.name(),
                self.name
            )));
        }
        servers.push(Arc::new(MonitoredBackend::new(backend, self.now_ms())));
        Ok(())
    }

    /// Remove a backend from a stopped monitor.
    pub fn remove_backend(&self, name: &str) -> MonitorResult<()> {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.state != MonitorState::Stopped {
            return Err(MonitorError::not_stopped(format!(
                "monitor '{}' must be stopped to change membership",
                self.name
            )));
        }

        let mut servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        match servers.iter().position(|mb| mb.backend().name() == name) {
            Some(index) => {
                servers.remove(index);
                Ok(())
            }
            None => Err(MonitorError::unknown_backend(format!(
                "backend '{}' is not monitored by '{}'",
                name, self.name
            ))),
        }
    }

    fn find_monitored(&self, name: &str) -> Option<Arc<MonitoredBackend>> {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|mb| mb.backend().name() == name)
            .map(Arc::clone)
    }

    fn servers_snapshot(&self) -> Vec<Arc<MonitoredBackend>> {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ---- lifecycle ---------------------------------------------------

    /// Start the worker. A running monitor is left as is.
    pub fn start(self: &Arc<Self>) -> MonitorResult<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.state == MonitorState::Running {
            return Ok(());
        }

        let settings = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        {
            let mut journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
            match journal.is_stale(settings.journal_max_age) {
                Ok(true) => {
                    Logger::warn(
                        "JOURNAL_STALE",
                        &[
                            ("max_age_secs", &settings.journal_max_age.as_secs().to_string()),
                            ("monitor", &self.name),
                        ],
                    );
                    if let Err(e) = journal.remove() {
                        Logger::error("JOURNAL_REMOVE_FAILED", &[("error", &e.to_string())]);
                    }
                }
                Ok(false) => {}
                Err(e) => Logger::error("JOURNAL_INSPECT_FAILED", &[("error", &e.to_string())]),
            }
        }

        if !lifecycle.checked {
            self.check_permissions(&settings)?;
            lifecycle.checked = true;
        }

        self.load_journal();

        *self.hook_runner.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(EventHookRunner::new(Arc::clone(&self.metrics)));

        self.running.store(true, Ordering::Release);
        let worker_self = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("monitor-{}", self.name))
            .spawn(move || worker_self.worker_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                MonitorError::worker_spawn(format!(
                    "failed to spawn worker for monitor '{}': {}",
                    self.name, e
                ))
            })?;

        lifecycle.worker = Some(handle);
        lifecycle.state = MonitorState::Running;
        Logger::info("MONITOR_STARTED", &[("monitor", &self.name)]);
        Ok(())
    }

    /// Signal the worker, join it, close probe connections. Returns after
    /// the final tick has drained.
    pub fn stop(&self) -> MonitorResult<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.state == MonitorState::Stopped {
            return Ok(());
        }

        self.running.store(false, Ordering::Release);
        {
            let _guard = self.sleep_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.sleep_cv.notify_all();
        }

        if let Some(worker) = lifecycle.worker.take() {
            let _ = worker.join();
        }

        for mb in self.servers_snapshot() {
            mb.close_connection();
        }

        if let Some(mut runner) = self
            .hook_runner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            runner.stop();
        }

        lifecycle.state = MonitorState::Stopped;
        Logger::info("MONITOR_STOPPED", &[("monitor", &self.name)]);
        Ok(())
    }

    /// Start-time permission probe. Unreachable backends are tolerated;
    /// an explicit access-denied fails the start.
    fn check_permissions(&self, settings: &MonitorSettings) -> MonitorResult<()> {
        let query = {
            let module = self.module.lock().unwrap_or_else(|e| e.into_inner());
            module.permissions_query().to_string()
        };

        for mb in self.servers_snapshot() {
            let backend = mb.backend();
            let mut state = mb.state();
            let outcome =
                ping_or_connect(self.connector.as_ref(), backend, &settings.conn, &mut state.conn);

            let denied = match outcome {
                ConnectOutcome::ExistingOk | ConnectOutcome::NewOk => {
                    match state.conn.as_mut() {
                        Some(conn) => match conn.check_permissions(&query) {
                            Ok(()) => None,
                            Err(e) if e.kind == ProbeErrorKind::AccessDenied => Some(e.message),
                            Err(e) => {
                                Logger::error(
                                    "PERMISSION_QUERY_FAILED",
                                    &[
                                        ("backend", backend.name()),
                                        ("error", &e.to_string()),
                                        ("monitor", &self.name),
                                    ],
                                );
                                None
                            }
                        },
                        None => None,
                    }
                }
                ConnectOutcome::Failed(e) if e.kind == ProbeErrorKind::AccessDenied => {
                    Some(e.message)
                }
                ConnectOutcome::Failed(e) => {
                    Logger::error(
                        "PERMISSION_PROBE_UNREACHABLE",
                        &[
                            ("backend", backend.name()),
                            ("endpoint", &backend.endpoint()),
                            ("error", &e.to_string()),
                            ("monitor", &self.name),
                        ],
                    );
                    None
                }
            };

            if let Some(message) = denied {
                return Err(MonitorError::permission_check(format!(
                    "monitor '{}' user lacks permissions on backend '{}': {}",
                    self.name,
                    backend.name(),
                    message
                )));
            }
        }

        Ok(())
    }

    /// Restore last-known state from the journal. Malformed journals are
    /// logged and ignored.
    fn load_journal(&self) {
        let loaded = {
            let journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
            journal.load()
        };

        let contents = match loaded {
            Ok(Some(contents)) => contents,
            Ok(None) => return,
            Err(e) => {
                Logger::error(
                    "JOURNAL_LOAD_FAILED",
                    &[("error", &e.to_string()), ("monitor", &self.name)],
                );
                return;
            }
        };

        for entry in &contents.backends {
            if let Some(mb) = self.find_monitored(&entry.name) {
                let flags = StatusFlags::from_bits(entry.status);
                mb.backend().store_status(flags);
                let mut state = mb.state();
                state.prev_status = flags;
                state.pending_status = flags;
            }
        }

        if let Some(master) = &contents.master {
            if self.find_monitored(master).is_some() {
                *self.master.lock().unwrap_or_else(|e| e.into_inner()) = Some(master.clone());
            }
        }

        Logger::info("JOURNAL_LOADED", &[("monitor", &self.name)]);
    }

    // ---- worker ------------------------------------------------------

    fn worker_loop(self: Arc<Self>) {
        let mut interval = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .interval;

        // The first tick runs immediately.
        let mut loop_called = self.now_ms() - interval.as_millis() as i64;

        while self.running.load(Ordering::Acquire) {
            let now = self.now_ms();
            let immediate = {
                let module = self.module.lock().unwrap_or_else(|e| e.into_inner());
                module.immediate_tick_required()
            };

            if now - loop_called >= interval.as_millis() as i64
                || self.check_requests.load(Ordering::Acquire)
                || immediate
            {
                loop_called = self.now_ms();
                self.run_one_tick();
                interval = self
                    .settings
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .interval;
            }

            let elapsed = self.now_ms() - loop_called;
            let remaining = interval.as_millis() as i64 - elapsed;
            let delay = if remaining <= 0 || remaining >= BASE_SLEEP.as_millis() as i64 {
                BASE_SLEEP
            } else {
                Duration::from_millis(remaining as u64)
            };

            let guard = self.sleep_lock.lock().unwrap_or_else(|e| e.into_inner());
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            if self.check_requests.load(Ordering::Acquire) {
                continue;
            }
            let _ = self.sleep_cv.wait_timeout(guard, delay);
        }
    }

    fn run_one_tick(&self) {
        let servers = self.servers_snapshot();
        let settings = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        self.drain_admin_requests(&servers);
        self.probe_phase(&servers, &settings);
        self.publish_phase(&servers);
        self.detect_and_dispatch(&servers, &settings);
        self.hangup_phase(&servers);
        self.journal_phase(&servers);

        {
            let mut module = self.module.lock().unwrap_or_else(|e| e.into_inner());
            module.post_tick();
        }

        // Publish the tick only after every backend's state is visible.
        {
            let _guard = self.tick_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.ticks.fetch_add(1, Ordering::Release);
            self.tick_cv.notify_all();
        }
        self.metrics.increment_monitor_ticks();
    }

    /// Tick step 1: apply staged maintenance/drain requests.
    fn drain_admin_requests(&self, servers: &[Arc<MonitoredBackend>]) {
        if !self.check_requests.swap(false, Ordering::AcqRel) {
            return;
        }

        for mb in servers {
            let backend = mb.backend();
            match mb.take_request() {
                AdminRequest::None => {}
                AdminRequest::MaintOn => backend.set_status_bits(StatusFlags::MAINT),
                AdminRequest::MaintOff => backend.clear_status_bits(StatusFlags::MAINT),
                AdminRequest::DrainOn => backend.set_status_bits(StatusFlags::DRAINING),
                AdminRequest::DrainOff => backend.clear_status_bits(StatusFlags::DRAINING),
            }
        }
    }

    /// Tick steps 2-4: probe, classify, stage pending flags.
    fn probe_phase(&self, servers: &[Arc<MonitoredBackend>], settings: &MonitorSettings) {
        {
            let mut module = self.module.lock().unwrap_or_else(|e| e.into_inner());
            module.pre_tick();
        }

        for mb in servers {
            let backend = mb.backend();
            if backend.status().is_in_maint() {
                continue;
            }

            let mut guard = mb.state();
            let state = &mut *guard;
            state.prev_status = backend.status();
            state.pending_status = backend.status();

            let outcome =
                ping_or_connect(self.connector.as_ref(), backend, &settings.conn, &mut state.conn);

            match outcome {
                ConnectOutcome::ExistingOk | ConnectOutcome::NewOk => {
                    state.pending_status = state
                        .pending_status
                        .without(StatusFlags::AUTH_ERROR)
                        .with(StatusFlags::RUNNING);

                    if self.should_check_disk_space(settings, state.disk_space_checked, backend) {
                        self.update_disk_space(settings, state, backend);
                    }

                    let mut module = self.module.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(conn) = state.conn.as_mut() {
                        let mut pending = state.pending_status;
                        module.update_backend(conn.as_mut(), backend, &mut pending);
                        state.pending_status = pending;
                    }
                }
                ConnectOutcome::Failed(error) => {
                    let was_master = state.pending_status.is_master();
                    state.pending_status = state.pending_status.without(
                        StatusFlags::RUNNING
                            | StatusFlags::ROLE_BITS
                            | StatusFlags::DISK_EXHAUSTED
                            | StatusFlags::AUTH_ERROR,
                    );
                    if was_master {
                        state.pending_status = state.pending_status.with(StatusFlags::WAS_MASTER);
                    }

                    if error.kind == ProbeErrorKind::AccessDenied {
                        state.pending_status =
                            state.pending_status.with(StatusFlags::AUTH_ERROR);
                    }

                    // First failure after a healthy stretch gets a log
                    // line; repeats stay quiet until the state recovers.
                    if events::status_changed(state.prev_status, state.pending_status)
                        && state.err_count == 0
                    {
                        let reason = if error.kind == ProbeErrorKind::TimedOut {
                            "monitor timed out when connecting to backend"
                        } else {
                            "monitor was unable to connect to backend"
                        };
                        Logger::error(
                            "BACKEND_CONNECT_FAILED",
                            &[
                                ("backend", backend.name()),
                                ("endpoint", &backend.endpoint()),
                                ("error", &error.to_string()),
                                ("monitor", &self.name),
                                ("reason", reason),
                            ],
                        );
                    }
                }
            }

            if state.pending_status.is_down() {
                state.err_count += 1;
            } else {
                state.err_count = 0;
            }
        }
    }

    fn should_check_disk_space(
        &self,
        settings: &MonitorSettings,
        last_checked: i64,
        backend: &Backend,
    ) -> bool {
        if settings.disk_space_check_interval.is_zero() || last_checked == DISK_CHECK_DISABLED {
            return false;
        }
        if settings.disk_space_limits.is_empty() && backend.disk_space_limits().is_none() {
            return false;
        }
        self.now_ms() - last_checked > settings.disk_space_check_interval.as_millis() as i64
    }

    /// Tick step 3b: per-path disk usage against thresholds.
    fn update_disk_space(
        &self,
        settings: &MonitorSettings,
        state: &mut super::monitored::ProbeState,
        backend: &Backend,
    ) {
        let Some(conn) = state.conn.as_mut() else {
            return;
        };

        match conn.disk_space() {
            Ok(usages) => {
                // Backend-specific limits take precedence.
                let limits = backend
                    .disk_space_limits()
                    .unwrap_or_else(|| settings.disk_space_limits.clone());

                let evaluation = disk::evaluate(&usages, &limits);

                for (path, used, max) in &evaluation.breaches {
                    Logger::error(
                        "DISK_SPACE_EXHAUSTED",
                        &[
                            ("backend", backend.name()),
                            ("endpoint", &backend.endpoint()),
                            ("max_pct", &max.to_string()),
                            ("path", path),
                            ("used_pct", &used.to_string()),
                        ],
                    );
                }
                for path in &evaluation.missing_paths {
                    Logger::warn(
                        "DISK_SPACE_PATH_MISSING",
                        &[("backend", backend.name()), ("path", path)],
                    );
                }

                state.pending_status = if evaluation.exhausted {
                    state.pending_status.with(StatusFlags::DISK_EXHAUSTED)
                } else {
                    state.pending_status.without(StatusFlags::DISK_EXHAUSTED)
                };
                state.disk_space_checked = self.now_ms();
            }
            Err(DiskSpaceError::Unsupported(message)) => {
                state.disk_space_checked = DISK_CHECK_DISABLED;
                Logger::error(
                    "DISK_SPACE_CHECK_DISABLED",
                    &[
                        ("backend", backend.name()),
                        ("endpoint", &backend.endpoint()),
                        ("error", &message),
                    ],
                );
            }
            Err(DiskSpaceError::Query(message)) => {
                Logger::error(
                    "DISK_SPACE_CHECK_FAILED",
                    &[
                        ("backend", backend.name()),
                        ("endpoint", &backend.endpoint()),
                        ("error", &message),
                    ],
                );
            }
        }
    }

    /// Tick step 5: copy pending flags to the published word.
    fn publish_phase(&self, servers: &[Arc<MonitoredBackend>]) {
        for mb in servers {
            let backend = mb.backend();
            if backend.status().is_in_maint() {
                continue;
            }
            let state = mb.state();
            backend.store_status(state.pending_status);
        }
    }

    /// Tick step 6: transitions, log lines, event hooks.
    fn detect_and_dispatch(&self, servers: &[Arc<MonitoredBackend>], settings: &MonitorSettings) {
        let mut master_down = false;
        let mut master_up = false;

        for mb in servers {
            let backend = mb.backend();
            let prev = mb.state().prev_status;
            let current = backend.status();

            if !events::status_changed(prev, current) {
                continue;
            }
            let Some(event) = events::compute_transition(prev, current) else {
                continue;
            };

            backend.record_event(event.name(), Utc::now());
            Logger::info(
                "BACKEND_STATE_CHANGED",
                &[
                    ("backend", backend.name()),
                    ("endpoint", &backend.endpoint()),
                    ("event", event.name()),
                    ("from", &prev.to_string()),
                    ("monitor", &self.name),
                    ("to", &current.to_string()),
                ],
            );

            match event {
                MonitorEvent::MasterDown => master_down = true,
                MonitorEvent::MasterUp | MonitorEvent::NewMaster => master_up = true,
                _ => {}
            }

            if let Some(script) = &settings.script {
                if settings.events.contains(event) {
                    self.dispatch_hook(script, event, backend, servers, settings);
                }
            }
        }

        if master_down && master_up {
            Logger::info(
                "MASTER_SWITCH",
                &[("monitor", &self.name)],
            );
        }
    }

    fn dispatch_hook(
        &self,
        script: &str,
        event: MonitorEvent,
        initiator: &Backend,
        servers: &[Arc<MonitoredBackend>],
        settings: &MonitorSettings,
    ) {
        let backends: Vec<Arc<Backend>> =
            servers.iter().map(|mb| Arc::clone(mb.backend())).collect();

        let rendered = render_command(
            script,
            &HookContext {
                event,
                initiator,
                servers: &backends,
                default_user: &settings.conn.user,
                default_password: &settings.conn.password,
            },
        );

        {
            let mut seen = self.unknown_tokens.lock().unwrap_or_else(|e| e.into_inner());
            for token in rendered.unknown_tokens {
                if seen.insert(token.clone()) {
                    Logger::warn(
                        "HOOK_UNKNOWN_TOKEN",
                        &[("monitor", &self.name), ("token", &token)],
                    );
                }
            }
        }

        if let Some(runner) = self
            .hook_runner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            runner.enqueue(HookJob {
                monitor: self.name.clone(),
                backend: initiator.name().to_string(),
                event: event.name(),
                command: rendered.command,
                timeout: settings.script_timeout,
            });
        }
    }

    /// Tick step 7: sessions on unusable backends are hung up.
    fn hangup_phase(&self, servers: &[Arc<MonitoredBackend>]) {
        let handler = self.hangup.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(handler) = handler else {
            return;
        };

        for mb in servers {
            let backend = mb.backend();
            let prev = mb.state().prev_status;
            let current = backend.status();

            if events::status_changed(prev, current)
                && (!current.is_usable() || !current.is_in_cluster())
            {
                handler.hangup_backend(backend.name());
            }
        }
    }

    /// Tick step 8: persist published state when it changed.
    fn journal_phase(&self, servers: &[Arc<MonitoredBackend>]) {
        // Root master: usable (running, not in maintenance) master with
        // the highest weight; earlier membership order breaks ties. The
        // same rule the router selects by, so the journal's master
        // pointer never names a backend the router would refuse.
        let mut root_master: Option<&Arc<MonitoredBackend>> = None;
        for mb in servers {
            let status = mb.backend().status();
            if !status.is_usable() || !status.is_master() {
                continue;
            }
            match root_master {
                Some(current) if mb.backend().weight() <= current.backend().weight() => {}
                _ => root_master = Some(mb),
            }
        }
        let root_master = root_master.map(|mb| mb.backend().name().to_string());

        *self.master.lock().unwrap_or_else(|e| e.into_inner()) = root_master.clone();

        let contents = JournalContents {
            backends: servers
                .iter()
                .map(|mb| JournalEntry {
                    name: mb.backend().name().to_string(),
                    status: mb.backend().status().bits(),
                })
                .collect(),
            master: root_master,
        };

        let mut journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        match journal.store(&contents) {
            Ok(true) => self.metrics.increment_journal_writes(),
            Ok(false) => {}
            Err(e) => {
                self.metrics.increment_journal_write_failures();
                Logger::error(
                    "JOURNAL_WRITE_FAILED",
                    &[("error", &e.to_string()), ("monitor", &self.name)],
                );
            }
        }
    }

    // ---- synchronization ---------------------------------------------

    /// Block until the tick counter advances by `ticks` or the timeout
    /// expires. Returns whether the target was reached.
    pub fn wait_for_tick(&self, ticks: u64, timeout: Duration) -> bool {
        let target = self.ticks().saturating_add(ticks);
        let deadline = Instant::now() + timeout;

        let mut guard = self.tick_lock.lock().unwrap_or_else(|e| e.into_inner());
        while self.ticks() < target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .tick_cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = g;
        }
        true
    }

    // ---- admin operations --------------------------------------------

    /// Set status bits on a monitored backend. On a running monitor only
    /// MAINT and DRAINING may be set; the request is staged for the next
    /// tick.
    pub fn set_backend_status(&self, backend_name: &str, bits: u64) -> MonitorResult<()> {
        self.admin_status_change(backend_name, bits, true)
    }

    /// Clear status bits on a monitored backend, with the same rules as
    /// [`Monitor::set_backend_status`].
    pub fn clear_backend_status(&self, backend_name: &str, bits: u64) -> MonitorResult<()> {
        self.admin_status_change(backend_name, bits, false)
    }

    fn admin_status_change(&self, backend_name: &str, bits: u64, set: bool) -> MonitorResult<()> {
        let mb = self.find_monitored(backend_name).ok_or_else(|| {
            MonitorError::unknown_backend(format!(
                "backend '{}' is not monitored by '{}'",
                backend_name, self.name
            ))
        })?;

        let running = self.state() == MonitorState::Running;
        if !running {
            // Stopped monitor: the bit is applied directly.
            if set {
                mb.backend().set_status_bits(bits);
            } else {
                mb.backend().clear_status_bits(bits);
            }
            return Ok(());
        }

        if bits & !(StatusFlags::MAINT | StatusFlags::DRAINING) != 0 {
            return Err(MonitorError::status_change_denied());
        }

        let request = match (set, bits & StatusFlags::MAINT != 0) {
            (true, true) => AdminRequest::MaintOn,
            (false, true) => AdminRequest::MaintOff,
            (true, false) => AdminRequest::DrainOn,
            (false, false) => AdminRequest::DrainOff,
        };

        let previous = mb.stage_request(request);
        if previous != AdminRequest::None {
            Logger::warn(
                "ADMIN_REQUEST_OVERWRITTEN",
                &[
                    ("backend", backend_name),
                    ("monitor", &self.name),
                    ("warning", WRN_REQUEST_OVERWRITTEN),
                ],
            );
        }

        // Wake the worker so the request is applied within the base sleep
        // slice rather than a full interval.
        self.check_requests.store(true, Ordering::Release);
        {
            let _guard = self.sleep_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.sleep_cv.notify_all();
        }
        Ok(())
    }

    /// Operator-facing state document.
    ///
    /// Each lock is taken and released in turn; none is held across
    /// another, so this can run concurrently with lifecycle changes.
    pub fn diagnostics(&self) -> serde_json::Value {
        let state = match self.state() {
            MonitorState::Running => "Running",
            MonitorState::Stopped => "Stopped",
        };
        let ticks = self.ticks();
        let master = self.master();
        let settings = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let (module_name, module_diagnostics) = {
            let module = self.module.lock().unwrap_or_else(|e| e.into_inner());
            (module.name(), module.diagnostics())
        };

        serde_json::json!({
            "name": self.name,
            "module": module_name,
            "state": state,
            "ticks": ticks,
            "interval_ms": settings.interval.as_millis() as u64,
            "connect_timeout_secs": settings.conn.connect_timeout.as_secs(),
            "connect_attempts": settings.conn.connect_attempts,
            "master": master,
            "module_diagnostics": module_diagnostics,
            "servers": self
                .servers_snapshot()
                .iter()
                .map(|mb| mb.backend().diagnostics())
                .collect::<Vec<_>>(),
        })
    }

    /// Path of this monitor's journal file, for the CLI inspector.
    pub fn journal_path(&self) -> PathBuf {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .path()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        debug_assert!(
            self.state() == MonitorState::Stopped,
            "monitor '{}' dropped while running",
            self.name
        );
    }
}
