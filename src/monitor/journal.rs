//! Crash-safe journal of last-known backend states.
//!
//! On-disk layout, one file per monitor
//! (`<datadir>/<monitor-name>/monitor.dat`):
//!
//! ```text
//! offset 0       : u32 LE payload size
//! offset 4       : u8  schema version (= 2)
//! offset 5       : records
//!                    u8 type (1 = backend state, 2 = master pointer)
//!                    NUL-terminated backend name
//!                    type 1 only: u64 LE status flags
//! offset 4+size-4: u32 LE CRC32 over [schema version .. last record]
//! ```
//!
//! The file is published by rename: content goes to a temp file in the
//! same directory, is flushed and fsynced, then renamed over the final
//! name. Readers see either the old complete file or the new one.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::{MonitorError, MonitorResult};

/// Journal schema version. Files with any other version are ignored.
pub const SCHEMA_VERSION: u8 = 2;

const LEN_SIZE: usize = 4;
const LEN_SCHEMA: usize = 1;
const LEN_CRC: usize = 4;
const LEN_TYPE: usize = 1;
const LEN_STATUS: usize = 8;

const TYPE_BACKEND_STATE: u8 = 1;
const TYPE_MASTER_POINTER: u8 = 2;

const JOURNAL_FILE: &str = "monitor.dat";

/// One persisted backend state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub name: String,
    pub status: u64,
}

/// Everything a journal file holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalContents {
    pub backends: Vec<JournalEntry>,
    pub master: Option<String>,
}

/// Journal reader/writer for one monitor.
pub struct Journal {
    dir: PathBuf,
    last_hash: Option<[u8; 32]>,
}

impl Journal {
    pub fn new(data_dir: &Path, monitor_name: &str) -> Self {
        Self {
            dir: data_dir.join(monitor_name),
            last_hash: None,
        }
    }

    /// Path of the published journal file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    /// Serialize journal contents to the full on-disk byte layout.
    pub fn encode(contents: &JournalContents) -> Vec<u8> {
        let mut size = LEN_SCHEMA + LEN_CRC;
        for entry in &contents.backends {
            size += LEN_TYPE + entry.name.len() + 1 + LEN_STATUS;
        }
        if let Some(master) = &contents.master {
            size += LEN_TYPE + master.len() + 1;
        }

        let mut buf = Vec::with_capacity(LEN_SIZE + size);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.push(SCHEMA_VERSION);

        for entry in &contents.backends {
            buf.push(TYPE_BACKEND_STATE);
            buf.extend_from_slice(entry.name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(&entry.status.to_le_bytes());
        }

        if let Some(master) = &contents.master {
            buf.push(TYPE_MASTER_POINTER);
            buf.extend_from_slice(master.as_bytes());
            buf.push(0);
        }

        // CRC over everything after the length field, minus the CRC slot.
        let crc = crc32fast::hash(&buf[LEN_SIZE..]);
        buf.extend_from_slice(&crc.to_le_bytes());

        debug_assert_eq!(buf.len(), LEN_SIZE + size);
        buf
    }

    /// Decode a full journal buffer. Any structural defect is an error;
    /// callers log and ignore, never partially apply.
    pub fn decode(raw: &[u8]) -> MonitorResult<JournalContents> {
        if raw.len() < LEN_SIZE + LEN_SCHEMA + LEN_CRC {
            return Err(MonitorError::journal("journal file is truncated"));
        }

        let size = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() != LEN_SIZE + size {
            return Err(MonitorError::journal(format!(
                "journal length mismatch: header says {} bytes, file has {}",
                size,
                raw.len() - LEN_SIZE
            )));
        }

        let payload = &raw[LEN_SIZE..];
        if payload[0] != SCHEMA_VERSION {
            return Err(MonitorError::journal(format!(
                "unknown journal schema version: {}",
                payload[0]
            )));
        }

        let crc_offset = payload.len() - LEN_CRC;
        let stored_crc = u32::from_le_bytes([
            payload[crc_offset],
            payload[crc_offset + 1],
            payload[crc_offset + 2],
            payload[crc_offset + 3],
        ]);
        if crc32fast::hash(&payload[..crc_offset]) != stored_crc {
            return Err(MonitorError::journal("journal CRC32 mismatch"));
        }

        let mut contents = JournalContents::default();
        let mut cursor = LEN_SCHEMA;
        let records = &payload[..crc_offset];

        while cursor < records.len() {
            let record_type = records[cursor];
            cursor += LEN_TYPE;

            let name_end = records[cursor..]
                .iter()
                .position(|b| *b == 0)
                .map(|p| cursor + p)
                .ok_or_else(|| {
                    MonitorError::journal("journal record name is missing its NUL terminator")
                })?;
            let name = String::from_utf8(records[cursor..name_end].to_vec())
                .map_err(|_| MonitorError::journal("journal record name is not UTF-8"))?;
            cursor = name_end + 1;

            match record_type {
                TYPE_BACKEND_STATE => {
                    if cursor + LEN_STATUS > records.len() {
                        return Err(MonitorError::journal(
                            "journal backend record is missing its status word",
                        ));
                    }
                    let mut status_bytes = [0u8; LEN_STATUS];
                    status_bytes.copy_from_slice(&records[cursor..cursor + LEN_STATUS]);
                    cursor += LEN_STATUS;

                    contents.backends.push(JournalEntry {
                        name,
                        status: u64::from_le_bytes(status_bytes),
                    });
                }
                TYPE_MASTER_POINTER => {
                    contents.master = Some(name);
                }
                other => {
                    return Err(MonitorError::journal(format!(
                        "unknown journal record type: {}",
                        other
                    )));
                }
            }
        }

        Ok(contents)
    }

    /// Write the journal atomically. Skips the write when the payload is
    /// unchanged since the last successful store. Returns whether a file
    /// was written.
    pub fn store(&mut self, contents: &JournalContents) -> MonitorResult<bool> {
        let encoded = Self::encode(contents);

        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        let hash: [u8; 32] = hasher.finalize().into();

        if self.last_hash == Some(hash) {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            MonitorError::journal(format!(
                "failed to create journal directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let tmp_path = self
            .dir
            .join(format!("{}.{}", JOURNAL_FILE, Uuid::new_v4().simple()));

        let result = Self::write_and_rename(&tmp_path, &self.path(), &encoded);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
            return result.map(|_| false);
        }

        self.last_hash = Some(hash);
        Ok(true)
    }

    fn write_and_rename(tmp: &Path, fin: &Path, data: &[u8]) -> MonitorResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(tmp).map_err(|e| {
            MonitorError::journal(format!("failed to open '{}': {}", tmp.display(), e))
        })?;

        file.write_all(data)
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                MonitorError::journal(format!("failed to write journal data to disk: {}", e))
            })?;

        fs::rename(tmp, fin).map_err(|e| {
            MonitorError::journal(format!(
                "failed to rename journal file '{}' to '{}': {}",
                tmp.display(),
                fin.display(),
                e
            ))
        })
    }

    /// Read the published journal. `Ok(None)` when no file exists; a
    /// malformed file is an error the caller logs and ignores.
    pub fn load(&self) -> MonitorResult<Option<JournalContents>> {
        let mut file = match File::open(self.path()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MonitorError::journal(format!(
                    "failed to open journal file: {}",
                    e
                )))
            }
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|e| MonitorError::journal(format!("failed to read journal file: {}", e)))?;

        Self::decode(&raw).map(Some)
    }

    /// True when the journal file exists but its mtime is older than
    /// `max_age`. A missing file is not stale; it is absent.
    pub fn is_stale(&self, max_age: Duration) -> MonitorResult<bool> {
        let metadata = match fs::metadata(self.path()) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(MonitorError::journal(format!(
                    "failed to inspect journal file: {}",
                    e
                )))
            }
        };

        let modified = metadata.modified().map_err(|e| {
            MonitorError::journal(format!("failed to read journal file mtime: {}", e))
        })?;

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age >= max_age)
    }

    /// Delete the published journal file, ignoring a missing file. The
    /// dedup hash is forgotten so the next store writes a fresh file.
    pub fn remove(&mut self) -> MonitorResult<()> {
        self.last_hash = None;
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MonitorError::journal(format!(
                "failed to remove journal file: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> JournalContents {
        JournalContents {
            backends: vec![
                JournalEntry {
                    name: "db-1".to_string(),
                    status: 0b11,
                },
                JournalEntry {
                    name: "db-2".to_string(),
                    status: 0b101,
                },
            ],
            master: Some("db-1".to_string()),
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let contents = sample();
        let decoded = Journal::decode(&Journal::encode(&contents)).unwrap();
        assert_eq!(decoded, contents);
    }

    #[test]
    fn test_round_trip_without_master() {
        let contents = JournalContents {
            backends: vec![JournalEntry {
                name: "solo".to_string(),
                status: 1,
            }],
            master: None,
        };
        let decoded = Journal::decode(&Journal::encode(&contents)).unwrap();
        assert_eq!(decoded, contents);
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        assert!(Journal::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut raw = Journal::encode(&sample());
        raw.pop();
        assert!(Journal::decode(&raw).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_schema() {
        let mut raw = Journal::encode(&sample());
        raw[LEN_SIZE] = 9;
        assert!(Journal::decode(&raw).is_err());
    }

    #[test]
    fn test_decode_rejects_corrupted_payload() {
        let mut raw = Journal::encode(&sample());
        // Flip a bit inside a status word; the CRC must catch it.
        let index = raw.len() - LEN_CRC - 2;
        raw[index] ^= 0x40;
        assert!(Journal::decode(&raw).is_err());
    }

    #[test]
    fn test_store_and_load() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");

        let contents = sample();
        assert!(journal.store(&contents).unwrap());
        assert_eq!(journal.load().unwrap(), Some(contents));
    }

    #[test]
    fn test_store_dedups_unchanged_payload() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");

        let contents = sample();
        assert!(journal.store(&contents).unwrap());
        assert!(!journal.store(&contents).unwrap());

        let mut changed = sample();
        changed.backends[0].status = 0;
        assert!(journal.store(&changed).unwrap());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let journal = Journal::new(tmp.path(), "cluster-mon");
        assert_eq!(journal.load().unwrap(), None);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");
        journal.store(&sample()).unwrap();

        let entries: Vec<_> = fs::read_dir(tmp.path().join("cluster-mon"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![JOURNAL_FILE.to_string()]);
    }

    #[test]
    fn test_staleness() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");

        // Absent file is not stale.
        assert!(!journal.is_stale(Duration::from_secs(60)).unwrap());

        journal.store(&sample()).unwrap();
        assert!(!journal.is_stale(Duration::from_secs(60)).unwrap());
        // A zero max-age makes any existing file stale.
        assert!(journal.is_stale(Duration::ZERO).unwrap());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");
        journal.store(&sample()).unwrap();

        journal.remove().unwrap();
        journal.remove().unwrap();
        assert_eq!(journal.load().unwrap(), None);

        // Removal forgets the dedup hash: the same contents write again.
        assert!(journal.store(&sample()).unwrap());
        assert!(journal.load().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_journal_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let mut journal = Journal::new(tmp.path(), "cluster-mon");
        journal.store(&sample()).unwrap();

        let mode = fs::metadata(journal.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
