//! CLI command implementations.

use std::fs;
use std::path::Path;

use crate::config::Parameters;
use crate::monitor::{Journal, MonitorSettings};
use crate::routing::parse_router_options;
use crate::server::StatusFlags;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Dispatch one CLI command.
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::CheckConfig { config } => check_config(&config),
        Command::InspectJournal { journal } => inspect_journal(&journal),
    }
}

/// Parse a `key=value` file into monitor parameters plus the router
/// option list, which is validated separately.
fn read_config_file(path: &Path) -> CliResult<(Parameters, Vec<String>)> {
    let raw = fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("failed to read '{}': {}", path.display(), e)))?;

    let mut params = Parameters::new();
    let mut router_options = Vec::new();

    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            CliError::invalid_config(format!(
                "line {} is not of the form key=value: '{}'",
                number + 1,
                line
            ))
        })?;

        let key = key.trim();
        let value = value.trim();
        if key == "router_options" {
            router_options = value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        } else {
            params.set(key, value);
        }
    }

    Ok((params, router_options))
}

fn check_config(path: &Path) -> CliResult<()> {
    let (params, router_options) = read_config_file(path)?;

    let settings = MonitorSettings::from_parameters(&params)
        .map_err(|e| CliError::invalid_config(e.to_string()))?;
    let filter = parse_router_options(&router_options)
        .map_err(|e| CliError::invalid_config(e.to_string()))?;

    let summary = serde_json::json!({
        "status": "ok",
        "monitor": {
            "interval_ms": settings.interval.as_millis() as u64,
            "journal_max_age_secs": settings.journal_max_age.as_secs(),
            "connect_attempts": settings.conn.connect_attempts,
            "connect_timeout_secs": settings.conn.connect_timeout.as_secs(),
            "script": settings.script,
            "script_timeout_secs": settings.script_timeout.as_secs(),
            "disk_space_check_interval_ms": settings.disk_space_check_interval.as_millis() as u64,
            "servers": settings.servers,
        },
        "router": {
            "filter_mask": filter.mask,
            "filter_value": filter.value,
        },
    });

    println!("{}", summary);
    Ok(())
}

fn inspect_journal(path: &Path) -> CliResult<()> {
    let raw = fs::read(path)
        .map_err(|e| CliError::io(format!("failed to read '{}': {}", path.display(), e)))?;

    let contents =
        Journal::decode(&raw).map_err(|e| CliError::invalid_journal(e.to_string()))?;

    let document = serde_json::json!({
        "status": "ok",
        "master": contents.master,
        "backends": contents
            .backends
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.name,
                    "status_bits": entry.status,
                    "status": StatusFlags::from_bits(entry.status).to_string(),
                })
            })
            .collect::<Vec<_>>(),
    });

    println!("{}", document);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{JournalContents, JournalEntry};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_check_config_accepts_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# probe settings").unwrap();
        writeln!(file, "monitor_interval=1000").unwrap();
        writeln!(file, "servers=db-1,db-2").unwrap();
        writeln!(file, "router_options=slave,running").unwrap();
        file.flush().unwrap();

        assert!(check_config(file.path()).is_ok());
    }

    #[test]
    fn test_check_config_rejects_unknown_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "monitor_intervall=1000").unwrap();
        file.flush().unwrap();

        let err = check_config(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "INVALID_CONFIG");
    }

    #[test]
    fn test_check_config_rejects_bad_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "monitor_interval").unwrap();
        file.flush().unwrap();

        assert!(check_config(file.path()).is_err());
    }

    #[test]
    fn test_inspect_journal_round_trip() {
        let contents = JournalContents {
            backends: vec![JournalEntry {
                name: "db-1".to_string(),
                status: StatusFlags::RUNNING | StatusFlags::MASTER,
            }],
            master: Some("db-1".to_string()),
        };

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&Journal::encode(&contents)).unwrap();
        file.flush().unwrap();

        assert!(inspect_journal(file.path()).is_ok());
    }

    #[test]
    fn test_inspect_journal_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a journal").unwrap();
        file.flush().unwrap();

        let err = inspect_journal(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "INVALID_JOURNAL");
    }
}
