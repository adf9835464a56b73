//! Monitor configuration.
//!
//! Settings arrive as a key/value parameter map and are validated into a
//! typed struct while the monitor is stopped. The recognized key set is
//! closed: unknown keys are configuration errors.

use std::time::Duration;

use crate::config::{ConfigResult, DiskSpaceLimits, Parameters};

use super::errors::{MonitorError, MonitorResult};
use super::events::EventMask;
use super::probe::ConnectionSettings;

pub const KEY_CONNECT_ATTEMPTS: &str = "backend_connect_attempts";
pub const KEY_CONNECT_TIMEOUT: &str = "backend_connect_timeout";
pub const KEY_READ_TIMEOUT: &str = "backend_read_timeout";
pub const KEY_WRITE_TIMEOUT: &str = "backend_write_timeout";
pub const KEY_MONITOR_INTERVAL: &str = "monitor_interval";
pub const KEY_JOURNAL_MAX_AGE: &str = "journal_max_age";
pub const KEY_DISK_SPACE_CHECK_INTERVAL: &str = "disk_space_check_interval";
pub const KEY_DISK_SPACE_THRESHOLD: &str = "disk_space_threshold";
pub const KEY_EVENTS: &str = "events";
pub const KEY_SCRIPT: &str = "script";
pub const KEY_SCRIPT_TIMEOUT: &str = "script_timeout";
pub const KEY_SERVERS: &str = "servers";
pub const KEY_USER: &str = "user";
pub const KEY_PASSWORD: &str = "password";

const RECOGNIZED_KEYS: &[&str] = &[
    KEY_CONNECT_ATTEMPTS,
    KEY_CONNECT_TIMEOUT,
    KEY_READ_TIMEOUT,
    KEY_WRITE_TIMEOUT,
    KEY_MONITOR_INTERVAL,
    KEY_JOURNAL_MAX_AGE,
    KEY_DISK_SPACE_CHECK_INTERVAL,
    KEY_DISK_SPACE_THRESHOLD,
    KEY_EVENTS,
    KEY_SCRIPT,
    KEY_SCRIPT_TIMEOUT,
    KEY_SERVERS,
    KEY_USER,
    KEY_PASSWORD,
];

/// Validated per-monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Probe connection settings (credentials, timeouts, attempt cap)
    pub conn: ConnectionSettings,
    /// Tick period
    pub interval: Duration,
    /// Journal staleness threshold
    pub journal_max_age: Duration,
    /// Event-hook command template; empty disables the hook
    pub script: Option<String>,
    /// Hook subprocess timeout
    pub script_timeout: Duration,
    /// Transition categories that fire the hook
    pub events: EventMask,
    /// Minimum interval between disk checks per backend; zero disables
    pub disk_space_check_interval: Duration,
    /// Monitor-wide disk thresholds
    pub disk_space_limits: DiskSpaceLimits,
    /// Ordered backend names
    pub servers: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            conn: ConnectionSettings::default(),
            interval: Duration::from_millis(2000),
            journal_max_age: Duration::from_secs(28800),
            script: None,
            script_timeout: Duration::from_secs(90),
            events: EventMask::all(),
            disk_space_check_interval: Duration::ZERO,
            disk_space_limits: DiskSpaceLimits::default(),
            servers: Vec::new(),
        }
    }
}

impl MonitorSettings {
    /// Build settings from a parameter map, starting from the defaults.
    pub fn from_parameters(params: &Parameters) -> MonitorResult<Self> {
        for key in params.keys() {
            if !RECOGNIZED_KEYS.contains(&key) {
                return Err(MonitorError::invalid_settings(format!(
                    "unrecognized monitor setting '{}'",
                    key
                )));
            }
        }

        Self::parse(params).map_err(|e| MonitorError::invalid_settings(e.to_string()))
    }

    fn parse(params: &Parameters) -> ConfigResult<Self> {
        let defaults = MonitorSettings::default();

        let conn = ConnectionSettings {
            user: params.get_string_or(KEY_USER, ""),
            password: params.get_string_or(KEY_PASSWORD, ""),
            connect_timeout: Duration::from_secs(
                params.get_positive_or(KEY_CONNECT_TIMEOUT, 3)? as u64,
            ),
            read_timeout: Duration::from_secs(params.get_positive_or(KEY_READ_TIMEOUT, 3)? as u64),
            write_timeout: Duration::from_secs(
                params.get_positive_or(KEY_WRITE_TIMEOUT, 3)? as u64,
            ),
            connect_attempts: params.get_positive_or(KEY_CONNECT_ATTEMPTS, 1)? as u32,
        };

        let events = if params.contains(KEY_EVENTS) {
            EventMask::parse(&params.get_list(KEY_EVENTS))?
        } else {
            EventMask::all()
        };

        let disk_space_limits = match params.get(KEY_DISK_SPACE_THRESHOLD) {
            Some(raw) => DiskSpaceLimits::parse(raw)?,
            None => DiskSpaceLimits::default(),
        };

        Ok(Self {
            conn,
            interval: {
                let interval = params.get_millis_or(KEY_MONITOR_INTERVAL, defaults.interval)?;
                if interval.is_zero() {
                    return Err(crate::config::ConfigError::invalid_value(
                        "'monitor_interval' must be positive",
                    ));
                }
                interval
            },
            journal_max_age: params.get_seconds_or(KEY_JOURNAL_MAX_AGE, defaults.journal_max_age)?,
            script: params.get(KEY_SCRIPT).map(str::to_string).filter(|s| !s.is_empty()),
            script_timeout: params.get_seconds_or(KEY_SCRIPT_TIMEOUT, defaults.script_timeout)?,
            events,
            disk_space_check_interval: params
                .get_millis_or(KEY_DISK_SPACE_CHECK_INTERVAL, Duration::ZERO)?,
            disk_space_limits,
            servers: params.get_list(KEY_SERVERS),
        })
    }
}
