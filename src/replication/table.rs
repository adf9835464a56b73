//! Per-table parsing state.
//!
//! A `Table` is created from a table-map event and owns the row work
//! queued for it since the last flush. Entries never outlive the stream
//! session that created them.

use super::event::{RowChange, TableId};

/// Descriptor and pending row work for one mapped table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    id: TableId,
    schema: String,
    name: String,
    columns: u16,
    queue: Vec<RowChange>,
}

impl Table {
    /// Build a fresh descriptor from a table-map event.
    pub fn from_map(id: TableId, schema: impl Into<String>, name: impl Into<String>, columns: u16) -> Self {
        Self {
            id,
            schema: schema.into(),
            name: name.into(),
            columns,
            queue: Vec::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// `schema.table`, for logs and sink routing.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Queue one row change for in-order processing.
    pub fn enqueue(&mut self, change: RowChange) {
        self.queue.push(change);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain the queued row work, preserving arrival order.
    pub fn take_pending(&mut self) -> Vec<RowChange> {
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::event::RowKind;

    #[test]
    fn test_qualified_name() {
        let table = Table::from_map(7, "shop", "orders", 4);
        assert_eq!(table.qualified_name(), "shop.orders");
    }

    #[test]
    fn test_enqueue_preserves_order() {
        let mut table = Table::from_map(7, "shop", "orders", 4);
        table.enqueue(RowChange::write(vec![1]));
        table.enqueue(RowChange::delete(vec![2]));
        table.enqueue(RowChange::update(vec![3]));

        let drained = table.take_pending();
        assert_eq!(
            drained.iter().map(|c| c.kind).collect::<Vec<_>>(),
            vec![RowKind::Write, RowKind::Delete, RowKind::Update]
        );
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn test_take_pending_empties_queue() {
        let mut table = Table::from_map(7, "shop", "orders", 4);
        table.enqueue(RowChange::write(vec![1]));
        assert_eq!(table.take_pending().len(), 1);
        assert!(table.take_pending().is_empty());
    }
}
