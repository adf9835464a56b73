//! Backend monitoring: probing loop, state transitions, journal, hooks.

pub mod disk;
pub mod engine;
pub mod errors;
pub mod events;
pub mod journal;
pub mod monitored;
pub mod probe;
pub mod registry;
pub mod script;
pub mod settings;

pub use engine::{HangupHandler, Monitor, MonitorModule, MonitorState, SimpleModule};
pub use errors::{MonitorError, MonitorErrorKind, MonitorResult, ERR_CANNOT_MODIFY};
pub use events::{EventMask, MonitorEvent};
pub use journal::{Journal, JournalContents, JournalEntry};
pub use monitored::{AdminRequest, MonitoredBackend};
pub use probe::{
    ConnectOutcome, ConnectionSettings, Connector, DiskSpaceError, DiskSpaceUsage, ProbeConnection,
    ProbeError, ProbeErrorKind, RoleInfo,
};
pub use registry::MonitorRegistry;
pub use settings::MonitorSettings;
