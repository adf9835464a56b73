//! The replication stream worker.
//!
//! A small daemon: one thread that connects to a source backend's
//! replication stream, consumes typed events, tracks the transactional
//! cursor, and drives the downstream sink at transaction boundaries.
//!
//! The committed cursor is the only state that survives a disconnect.
//! Table maps and the in-flight transaction id are session-scoped and
//! rebuilt after every reconnect; the source replays uncommitted work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::observability::{Logger, MetricsRegistry};

use super::config::ReplicatorConfig;
use super::errors::{ReplicationError, ReplicationResult};
use super::event::{ReplicationEvent, RowChange, RowKind, TableId};
use super::gtid::GtidPosition;
use super::sink::EventSink;
use super::table::Table;

/// Delay before retrying a failed source connect.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One connected replication stream.
pub trait EventSource: Send {
    /// Fetch the next event. `None` means the stream is broken; the
    /// worker releases the connection and reconnects from the committed
    /// cursor.
    fn fetch_event(&mut self) -> Option<ReplicationEvent>;
}

/// Opens replication streams. Implementations issue the preparatory
/// statements from [`ReplicatorConfig::preparation_statements`] and
/// request the stream for the configured server id.
pub trait SourceConnector: Send + Sync {
    fn connect(
        &self,
        config: &ReplicatorConfig,
        cursor: Option<&GtidPosition>,
    ) -> ReplicationResult<Box<dyn EventSource>>;
}

struct Shared {
    config: ReplicatorConfig,
    connector: Arc<dyn SourceConnector>,
    sink: Mutex<Box<dyn EventSink>>,
    metrics: Arc<MetricsRegistry>,
    running: AtomicBool,
    error: Mutex<String>,
    cursor: Mutex<Option<GtidPosition>>,
}

/// Session-scoped stream state, dropped wholesale on disconnect.
struct StreamSession {
    source: Box<dyn EventSource>,
    tables: HashMap<TableId, Table>,
    in_flight: Option<GtidPosition>,
}

/// The replication stream processor. Constructing it starts the worker.
pub struct Replicator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Replicator {
    /// Validate the configuration and start the stream worker.
    pub fn start(
        config: ReplicatorConfig,
        connector: Arc<dyn SourceConnector>,
        sink: Box<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> ReplicationResult<Self> {
        config.validate()?;

        let cursor = config.start_position;
        let shared = Arc::new(Shared {
            config,
            connector,
            sink: Mutex::new(sink),
            metrics,
            running: AtomicBool::new(true),
            error: Mutex::new(String::new()),
            cursor: Mutex::new(cursor),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("replicator".to_string())
            .spawn(move || process_events(worker_shared))
            .map_err(|e| ReplicationError::Connect(format!("failed to spawn worker: {}", e)))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Request shutdown and join the worker.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// The latest connect/stream error message, if any.
    pub fn error(&self) -> String {
        self.shared
            .error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The committed cursor: the most recent transaction whose commit
    /// was published downstream.
    pub fn position(&self) -> Option<GtidPosition> {
        *self.shared.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_error(shared: &Shared, message: impl Into<String>) {
    let mut slot = shared.error.lock().unwrap_or_else(|e| e.into_inner());
    *slot = message.into();
}

fn process_events(shared: Arc<Shared>) {
    let mut session: Option<StreamSession> = None;

    while shared.running.load(Ordering::Acquire) {
        if session.is_none() {
            let cursor = *shared.cursor.lock().unwrap_or_else(|e| e.into_inner());
            match shared.connector.connect(&shared.config, cursor.as_ref()) {
                Ok(source) => {
                    session = Some(StreamSession {
                        source,
                        tables: HashMap::new(),
                        in_flight: None,
                    });
                }
                Err(e) => {
                    set_error(&shared, e.to_string());
                    Logger::error(
                        "STREAM_CONNECT_FAILED",
                        &[
                            ("cursor", &cursor.map(|c| c.to_string()).unwrap_or_default()),
                            ("error", &e.to_string()),
                        ],
                    );
                    sleep_while_running(&shared, RECONNECT_DELAY);
                    continue;
                }
            }
        }

        if let Some(current) = session.as_mut() {
            match current.source.fetch_event() {
                Some(event) => {
                    if let Err(e) = process_one_event(&shared, current, event) {
                        set_error(&shared, e.to_string());
                        Logger::error("STREAM_EVENT_FAILED", &[("error", &e.to_string())]);
                        session = None;
                        shared.metrics.increment_stream_reconnects();
                    }
                }
                None => {
                    // The stream broke. Uncommitted work is discarded
                    // with the session; the source replays it after
                    // reconnect.
                    session = None;
                    shared.metrics.increment_stream_reconnects();
                }
            }
        }
    }
}

fn sleep_while_running(shared: &Shared, total: Duration) {
    let deadline = Instant::now() + total;
    while shared.running.load(Ordering::Acquire) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
    }
}

fn process_one_event(
    shared: &Shared,
    session: &mut StreamSession,
    event: ReplicationEvent,
) -> ReplicationResult<()> {
    match event {
        ReplicationEvent::TransactionStart {
            domain,
            source_id,
            sequence,
        } => {
            session.in_flight = Some(GtidPosition::new(domain, source_id, sequence));
            Ok(())
        }

        ReplicationEvent::TransactionCommit => {
            let Some(position) = session.in_flight.take() else {
                Logger::warn("STREAM_COMMIT_WITHOUT_START", &[]);
                return Ok(());
            };

            flush_tables(shared, session)?;
            {
                let mut sink = shared.sink.lock().unwrap_or_else(|e| e.into_inner());
                sink.commit(&position)?;
            }

            *shared.cursor.lock().unwrap_or_else(|e| e.into_inner()) = Some(position);
            shared.metrics.increment_transactions_replicated();
            Ok(())
        }

        ReplicationEvent::TableMap {
            table_id,
            schema,
            table,
            columns,
        } => {
            session
                .tables
                .insert(table_id, Table::from_map(table_id, schema, table, columns));
            Ok(())
        }

        ReplicationEvent::WriteRows { table_id, rows } => {
            enqueue_rows(session, table_id, RowKind::Write, rows);
            Ok(())
        }

        ReplicationEvent::UpdateRows { table_id, rows } => {
            enqueue_rows(session, table_id, RowKind::Update, rows);
            Ok(())
        }

        ReplicationEvent::DeleteRows { table_id, rows } => {
            enqueue_rows(session, table_id, RowKind::Delete, rows);
            Ok(())
        }

        ReplicationEvent::Query { schema, sql } => {
            flush_tables(shared, session)?;
            let mut sink = shared.sink.lock().unwrap_or_else(|e| e.into_inner());
            sink.apply_statement(&schema, &sql)
        }

        ReplicationEvent::Other { .. } => Ok(()),
    }
}

fn enqueue_rows(session: &mut StreamSession, table_id: TableId, kind: RowKind, rows: Vec<Vec<u8>>) {
    match session.tables.get_mut(&table_id) {
        Some(table) => {
            for data in rows {
                table.enqueue(RowChange { kind, data });
            }
        }
        None => {
            // Possible after a mid-transaction reconnect; the cursor is
            // untouched and the source replays the transaction.
            Logger::warn(
                "STREAM_ROWS_FOR_UNMAPPED_TABLE",
                &[("table_id", &table_id.to_string())],
            );
        }
    }
}

/// Flush queued row work on every mapped table, in table-id order.
fn flush_tables(shared: &Shared, session: &mut StreamSession) -> ReplicationResult<()> {
    let mut ids: Vec<TableId> = session.tables.keys().copied().collect();
    ids.sort_unstable();

    let mut sink = shared.sink.lock().unwrap_or_else(|e| e.into_inner());
    for id in ids {
        if let Some(table) = session.tables.get_mut(&id) {
            if table.pending() == 0 {
                continue;
            }
            let changes = table.take_pending();
            sink.apply_rows(table, changes)?;
        }
    }
    Ok(())
}
