//! Replication stream processor scenarios against scripted sources.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use relaygate::observability::MetricsRegistry;
use relaygate::replication::{
    EventSink, EventSource, GtidPosition, ReplicationError, ReplicationEvent, ReplicationResult,
    Replicator, ReplicatorConfig, RowChange, SourceConnector, Table,
};

struct ScriptedSource {
    events: std::vec::IntoIter<ReplicationEvent>,
}

impl EventSource for ScriptedSource {
    fn fetch_event(&mut self) -> Option<ReplicationEvent> {
        self.events.next()
    }
}

struct ScriptedConnector {
    sessions: Mutex<Vec<Vec<ReplicationEvent>>>,
    connect_cursors: Mutex<Vec<Option<GtidPosition>>>,
    prepared: Mutex<Vec<Vec<String>>>,
}

impl ScriptedConnector {
    fn new(sessions: Vec<Vec<ReplicationEvent>>) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            connect_cursors: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
        }
    }
}

impl SourceConnector for ScriptedConnector {
    fn connect(
        &self,
        config: &ReplicatorConfig,
        cursor: Option<&GtidPosition>,
    ) -> ReplicationResult<Box<dyn EventSource>> {
        self.connect_cursors.lock().unwrap().push(cursor.copied());
        // A real connector issues these on the source before requesting
        // the stream; record them so tests can verify the contract.
        self.prepared
            .lock()
            .unwrap()
            .push(config.preparation_statements(cursor));

        let mut sessions = self.sessions.lock().unwrap();
        if sessions.is_empty() {
            return Err(ReplicationError::Connect(
                "source is not reachable".to_string(),
            ));
        }
        Ok(Box::new(ScriptedSource {
            events: sessions.remove(0).into_iter(),
        }))
    }
}

/// A sink that enforces transaction-granularity idempotence: applying
/// the same transaction twice fails the test.
#[derive(Default)]
struct IdempotentSink {
    applied: HashSet<GtidPosition>,
    rows_in_flight: usize,
    effects: Vec<(GtidPosition, usize)>,
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<IdempotentSink>>);

impl EventSink for SharedSink {
    fn apply_rows(&mut self, _table: &Table, changes: Vec<RowChange>) -> ReplicationResult<()> {
        self.0.lock().unwrap().rows_in_flight += changes.len();
        Ok(())
    }

    fn commit(&mut self, position: &GtidPosition) -> ReplicationResult<()> {
        let mut sink = self.0.lock().unwrap();
        assert!(
            sink.applied.insert(*position),
            "transaction {} delivered twice",
            position
        );
        let rows = sink.rows_in_flight;
        sink.rows_in_flight = 0;
        sink.effects.push((*position, rows));
        Ok(())
    }

    fn apply_statement(&mut self, _schema: &str, _sql: &str) -> ReplicationResult<()> {
        Ok(())
    }
}

fn config_at(cursor: GtidPosition) -> ReplicatorConfig {
    ReplicatorConfig::new(vec!["db-1:3306".to_string()], "repl", "secret", 1234)
        .with_start_position(cursor)
}

fn gtid(sequence: u64) -> GtidPosition {
    GtidPosition::new(1, 101, sequence)
}

fn map_orders() -> ReplicationEvent {
    ReplicationEvent::TableMap {
        table_id: 7,
        schema: "shop".to_string(),
        table: "orders".to_string(),
        columns: 3,
    }
}

fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_reconnect_redelivery_is_applied_once() {
    // Session 1: at cursor 1-101-42, transaction 43 starts, three row
    // events arrive, then the source disconnects before the commit.
    let interrupted = vec![
        ReplicationEvent::TransactionStart {
            domain: 1,
            source_id: 101,
            sequence: 43,
        },
        map_orders(),
        ReplicationEvent::WriteRows {
            table_id: 7,
            rows: vec![vec![1], vec![2], vec![3]],
        },
    ];

    // Session 2: the source redelivers transaction 43 in full.
    let redelivered = vec![
        ReplicationEvent::TransactionStart {
            domain: 1,
            source_id: 101,
            sequence: 43,
        },
        map_orders(),
        ReplicationEvent::WriteRows {
            table_id: 7,
            rows: vec![vec![1], vec![2], vec![3]],
        },
        ReplicationEvent::TransactionCommit,
    ];

    let connector = Arc::new(ScriptedConnector::new(vec![interrupted, redelivered]));
    let sink = SharedSink::default();
    let mut replicator = Replicator::start(
        config_at(gtid(42)),
        Arc::clone(&connector) as Arc<dyn SourceConnector>,
        Box::new(sink.clone()),
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();

    wait_for(|| replicator.position() == Some(gtid(43)));
    replicator.stop();

    // Downstream saw transaction 43 exactly once, with all three rows.
    let sink = sink.0.lock().unwrap();
    assert_eq!(sink.effects, vec![(gtid(43), 3)]);

    // Both deliveries started from the committed cursor 1-101-42; the
    // in-flight id of the interrupted transaction was discarded.
    let cursors = connector.connect_cursors.lock().unwrap().clone();
    assert!(cursors.len() >= 2);
    assert_eq!(cursors[0], Some(gtid(42)));
    assert_eq!(cursors[1], Some(gtid(42)));
}

#[test]
fn test_connector_contract_includes_preparation_statements() {
    let connector = Arc::new(ScriptedConnector::new(vec![vec![
        ReplicationEvent::TransactionStart {
            domain: 1,
            source_id: 101,
            sequence: 43,
        },
        ReplicationEvent::TransactionCommit,
    ]]));
    let sink = SharedSink::default();
    let mut replicator = Replicator::start(
        config_at(gtid(42)),
        Arc::clone(&connector) as Arc<dyn SourceConnector>,
        Box::new(sink.clone()),
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();

    wait_for(|| replicator.position() == Some(gtid(43)));
    replicator.stop();

    let prepared = connector.prepared.lock().unwrap();
    let statements = &prepared[0];
    assert!(statements.contains(&"SET @slave_connect_state='1-101-42'".to_string()));
    assert!(statements.contains(&"SET @slave_gtid_strict_mode=1".to_string()));
    assert!(statements.contains(&"SET @slave_gtid_ignore_duplicates=1".to_string()));
}

#[test]
fn test_multiple_transactions_commit_in_order() {
    let mut events = Vec::new();
    for sequence in 44..=46 {
        events.push(ReplicationEvent::TransactionStart {
            domain: 1,
            source_id: 101,
            sequence,
        });
        events.push(map_orders());
        events.push(ReplicationEvent::WriteRows {
            table_id: 7,
            rows: vec![vec![sequence as u8]],
        });
        events.push(ReplicationEvent::TransactionCommit);
    }

    let connector = Arc::new(ScriptedConnector::new(vec![events]));
    let sink = SharedSink::default();
    let mut replicator = Replicator::start(
        config_at(gtid(43)),
        connector as Arc<dyn SourceConnector>,
        Box::new(sink.clone()),
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();

    wait_for(|| replicator.position() == Some(gtid(46)));
    replicator.stop();

    let sink = sink.0.lock().unwrap();
    assert_eq!(
        sink.effects,
        vec![(gtid(44), 1), (gtid(45), 1), (gtid(46), 1)]
    );
}

#[test]
fn test_metrics_track_transactions_and_reconnects() {
    let metrics = Arc::new(MetricsRegistry::new());
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![
            ReplicationEvent::TransactionStart {
                domain: 1,
                source_id: 101,
                sequence: 44,
            },
            ReplicationEvent::TransactionCommit,
        ],
        vec![],
    ]));

    let sink = SharedSink::default();
    let mut replicator = Replicator::start(
        config_at(gtid(43)),
        connector as Arc<dyn SourceConnector>,
        Box::new(sink.clone()),
        Arc::clone(&metrics),
    )
    .unwrap();

    wait_for(|| metrics.transactions_replicated() == 1);
    wait_for(|| metrics.stream_reconnects() >= 1);
    replicator.stop();
}
