//! Connection routing: one-shot backend selection and session validity.

pub mod config;
pub mod errors;
pub mod router;
pub mod session;

pub use config::{parse_router_options, RoleFilter};
pub use errors::{RoutingError, RoutingErrorKind, RoutingResult};
pub use router::Router;
pub use session::{BackendConnection, RouterSession, SessionConnector, SessionRegistry};
