//! Replication stream processing: cursor tracking, table maps, sinks.

pub mod config;
pub mod errors;
pub mod event;
pub mod gtid;
pub mod sink;
pub mod stream;
pub mod table;

pub use config::ReplicatorConfig;
pub use errors::{ReplicationError, ReplicationResult};
pub use event::{ReplicationEvent, RowChange, RowKind, TableId};
pub use gtid::GtidPosition;
pub use sink::EventSink;
pub use stream::{EventSource, Replicator, SourceConnector};
pub use table::Table;
