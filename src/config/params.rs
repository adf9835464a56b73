//! Typed access to key/value configuration parameters.
//!
//! Configuration *files* are parsed elsewhere; components here receive an
//! already-tokenized parameter map and pull typed values out of it.
//! Insertion order is preserved so that ordered settings (the backend
//! list) keep their configured order.

use std::time::Duration;

use super::errors::{ConfigError, ConfigResult};

/// Ordered key/value parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key. A repeated key overwrites the earlier value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All keys, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// String value or a default when absent.
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Required integer value.
    pub fn get_integer(&self, key: &str) -> ConfigResult<i64> {
        let raw = self
            .get(key)
            .ok_or_else(|| ConfigError::missing_key(format!("'{}' is not set", key)))?;
        raw.trim().parse::<i64>().map_err(|_| {
            ConfigError::invalid_value(format!("'{}' is not an integer: '{}'", key, raw))
        })
    }

    /// Integer value or a default when absent.
    pub fn get_integer_or(&self, key: &str, default: i64) -> ConfigResult<i64> {
        if self.contains(key) {
            self.get_integer(key)
        } else {
            Ok(default)
        }
    }

    /// Positive integer value or a default when absent.
    pub fn get_positive_or(&self, key: &str, default: i64) -> ConfigResult<i64> {
        let value = self.get_integer_or(key, default)?;
        if value <= 0 {
            return Err(ConfigError::invalid_value(format!(
                "'{}' is not a positive integer: {}",
                key, value
            )));
        }
        Ok(value)
    }

    /// Duration in whole seconds, or a default when absent.
    pub fn get_seconds_or(&self, key: &str, default: Duration) -> ConfigResult<Duration> {
        if !self.contains(key) {
            return Ok(default);
        }
        let secs = self.get_integer(key)?;
        if secs < 0 {
            return Err(ConfigError::invalid_value(format!(
                "'{}' must not be negative: {}",
                key, secs
            )));
        }
        Ok(Duration::from_secs(secs as u64))
    }

    /// Duration in whole milliseconds, or a default when absent.
    pub fn get_millis_or(&self, key: &str, default: Duration) -> ConfigResult<Duration> {
        if !self.contains(key) {
            return Ok(default);
        }
        let millis = self.get_integer(key)?;
        if millis < 0 {
            return Err(ConfigError::invalid_value(format!(
                "'{}' must not be negative: {}",
                key, millis
            )));
        }
        Ok(Duration::from_millis(millis as u64))
    }

    /// Comma- or whitespace-separated list value. Absent key is an empty
    /// list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(raw) => raw
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|token| !token.is_empty())
                .map(|token| token.to_string())
                .collect(),
            None => Vec::new(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Parameters::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut params = Parameters::new();
        params.set("monitor_interval", "2000");
        assert_eq!(params.get("monitor_interval"), Some("2000"));
        assert!(params.get("script").is_none());
    }

    #[test]
    fn test_repeated_key_overwrites() {
        let mut params = Parameters::new();
        params.set("user", "probe");
        params.set("user", "probe2");
        assert_eq!(params.get("user"), Some("probe2"));
        assert_eq!(params.keys().count(), 1);
    }

    #[test]
    fn test_integer_parsing() {
        let params: Parameters = [("backend_connect_attempts", " 3 ")].into_iter().collect();
        assert_eq!(params.get_integer("backend_connect_attempts").unwrap(), 3);
    }

    #[test]
    fn test_integer_rejects_garbage() {
        let params: Parameters = [("monitor_interval", "fast")].into_iter().collect();
        let err = params.get_integer("monitor_interval").unwrap_err();
        assert_eq!(err.kind, crate::config::ConfigErrorKind::InvalidValue);
    }

    #[test]
    fn test_missing_integer_uses_default() {
        let params = Parameters::new();
        assert_eq!(params.get_integer_or("journal_max_age", 28800).unwrap(), 28800);
    }

    #[test]
    fn test_positive_rejects_zero() {
        let params: Parameters = [("backend_connect_timeout", "0")].into_iter().collect();
        assert!(params.get_positive_or("backend_connect_timeout", 3).is_err());
    }

    #[test]
    fn test_durations() {
        let params: Parameters = [("monitor_interval", "2500"), ("journal_max_age", "60")]
            .into_iter()
            .collect();
        assert_eq!(
            params
                .get_millis_or("monitor_interval", Duration::from_millis(2000))
                .unwrap(),
            Duration::from_millis(2500)
        );
        assert_eq!(
            params
                .get_seconds_or("journal_max_age", Duration::from_secs(0))
                .unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_list_splits_on_commas_and_whitespace() {
        let params: Parameters = [("servers", "db-1, db-2  db-3,db-4")].into_iter().collect();
        assert_eq!(params.get_list("servers"), vec!["db-1", "db-2", "db-3", "db-4"]);
        assert!(params.get_list("absent").is_empty());
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut params = Parameters::new();
        params.set("b", "2");
        params.set("a", "1");
        let keys: Vec<_> = params.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
