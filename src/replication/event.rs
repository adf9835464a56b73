//! Typed replication events.
//!
//! Binary frame decoding is outside this crate; the stream processor
//! consumes already-typed events from its source. Row payloads stay
//! opaque: the processor orders and batches them, the downstream sink
//! interprets them.

/// Table identifier assigned by the source. Valid only within one
/// connected stream session.
pub type TableId = u64;

/// The kind of a row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Write,
    Update,
    Delete,
}

/// One row-level change, payload opaque to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub kind: RowKind,
    pub data: Vec<u8>,
}

impl RowChange {
    pub fn write(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: RowKind::Write,
            data: data.into(),
        }
    }

    pub fn update(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: RowKind::Update,
            data: data.into(),
        }
    }

    pub fn delete(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: RowKind::Delete,
            data: data.into(),
        }
    }
}

/// One event fetched from the replication stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationEvent {
    /// Transaction start; carries the transaction's GTID triple.
    TransactionStart {
        domain: u32,
        source_id: u32,
        sequence: u64,
    },

    /// Transaction commit.
    TransactionCommit,

    /// A new mapping from table id to table. Replaces any previous
    /// mapping for the same id.
    TableMap {
        table_id: TableId,
        schema: String,
        table: String,
        columns: u16,
    },

    /// Row-level writes for a mapped table.
    WriteRows {
        table_id: TableId,
        rows: Vec<Vec<u8>>,
    },

    /// Row-level updates for a mapped table.
    UpdateRows {
        table_id: TableId,
        rows: Vec<Vec<u8>>,
    },

    /// Row-level deletes for a mapped table.
    DeleteRows {
        table_id: TableId,
        rows: Vec<Vec<u8>>,
    },

    /// A statement (DDL or otherwise) executed on the source.
    Query { schema: String, sql: String },

    /// Any event type the processor does not act on.
    Other { event_type: u8 },
}
