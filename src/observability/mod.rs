//! Observability: structured logging and operational counters.

pub mod logger;
pub mod metrics;

pub use logger::{Logger, Severity};
pub use metrics::MetricsRegistry;
