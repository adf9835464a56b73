//! Backend catalog: identity, role flags, counters, registry.

pub mod backend;
pub mod errors;
pub mod registry;
pub mod status;

pub use backend::{Backend, Credentials, TransitionRecord};
pub use errors::{ServerError, ServerErrorKind, ServerResult};
pub use registry::BackendRegistry;
pub use status::StatusFlags;
