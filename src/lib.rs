//! relaygate - database proxy core
//!
//! Presents a pool of replicating database backends to clients as a
//! single server: monitors backend liveness and roles, routes each
//! client session to one backend by a role/least-connections policy,
//! and can follow a backend's replication stream to drive downstream
//! consumers.

pub mod cli;
pub mod config;
pub mod monitor;
pub mod observability;
pub mod replication;
pub mod routing;
pub mod server;
