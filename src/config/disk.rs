//! Disk-space threshold configuration.
//!
//! The `disk_space_threshold` setting is a comma-separated list of
//! `path:percentage` pairs. A literal `*` path applies to every mount not
//! named explicitly.

use super::errors::{ConfigError, ConfigResult};

/// Parsed disk-space thresholds for one monitor or one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSpaceLimits {
    entries: Vec<(String, u8)>,
    wildcard: Option<u8>,
}

impl DiskSpaceLimits {
    /// Parse a `path:pct,...` threshold list.
    ///
    /// An empty string parses to an empty limit set (disk checking
    /// disabled).
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let mut limits = DiskSpaceLimits::default();

        for item in raw.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            let (path, pct) = item.split_once(':').ok_or_else(|| {
                ConfigError::invalid_value(format!(
                    "disk space threshold '{}' is not of the form path:percentage",
                    item
                ))
            })?;

            let path = path.trim();
            let pct: u8 = pct.trim().parse().map_err(|_| {
                ConfigError::invalid_value(format!(
                    "disk space threshold '{}' has a non-numeric percentage",
                    item
                ))
            })?;

            if pct > 100 {
                return Err(ConfigError::invalid_value(format!(
                    "disk space threshold '{}' exceeds 100%",
                    item
                )));
            }

            if path == "*" {
                limits.wildcard = Some(pct);
            } else if path.starts_with('/') {
                limits.entries.push((path.to_string(), pct));
            } else {
                return Err(ConfigError::invalid_value(format!(
                    "disk space threshold path '{}' is not absolute",
                    path
                )));
            }
        }

        Ok(limits)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.wildcard.is_none()
    }

    /// Explicit `(path, max%)` entries, excluding the wildcard.
    pub fn entries(&self) -> &[(String, u8)] {
        &self.entries
    }

    /// The `*` threshold, if configured.
    pub fn wildcard(&self) -> Option<u8> {
        self.wildcard
    }

    /// The threshold that applies to `path`: the explicit entry if one
    /// exists, otherwise the wildcard.
    pub fn limit_for(&self, path: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, pct)| *pct)
            .or(self.wildcard)
    }
}
