//! Downstream sink seam.
//!
//! The processor drives the sink at transaction boundaries: row work is
//! flushed per table, then the commit is announced with its GTID. The
//! sink must be idempotent at transaction granularity, because the
//! source may redeliver transactions ending at or after the committed
//! cursor across a reconnect.

use super::errors::ReplicationResult;
use super::event::RowChange;
use super::gtid::GtidPosition;
use super::table::Table;

/// Consumer of per-transaction replication effects.
pub trait EventSink: Send {
    /// Receive one table's flushed row work, in arrival order.
    fn apply_rows(&mut self, table: &Table, changes: Vec<RowChange>) -> ReplicationResult<()>;

    /// A transaction committed at `position`. All its row work has been
    /// delivered through [`EventSink::apply_rows`].
    fn commit(&mut self, position: &GtidPosition) -> ReplicationResult<()>;

    /// Forward a statement observed on the stream. Pending row work on
    /// every mapped table has been flushed first.
    fn apply_statement(&mut self, schema: &str, sql: &str) -> ReplicationResult<()>;
}
