//! File-backed credential store.
//!
//! Two independent instances back the client: one over the trust file,
//! one over the tickets file. Both share the same line-record format and
//! the same access pattern: reads degrade gracefully (a missing or
//! unreadable file is an empty store, a malformed line is skipped with a
//! warning), writes acquire the advisory lock and are fatal on failure.

pub mod lock;
pub mod records;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::LockParams;
use lock::{FileLock, LockError};
use records::AuthRecord;

/// Errors from store mutations. Reads never fail.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("credential file I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Keyed record access to one credential file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    lock: LockParams,
}

impl RecordStore {
    pub fn new(path: PathBuf, lock: LockParams) -> Self {
        Self { path, lock }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every well-formed record. A missing or unreadable file is an
    /// empty store; malformed lines are logged and skipped.
    pub fn load_all(&self) -> Vec<AuthRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read credential file");
                return Vec::new();
            }
        };
        content
            .lines()
            .filter_map(|line| {
                let record = AuthRecord::parse_line(line);
                if record.is_none() && !line.trim().is_empty() && !line.trim_start().starts_with('#')
                {
                    warn!(path = %self.path.display(), "skipping malformed credential record");
                }
                record
            })
            .collect()
    }

    /// Look up the value stored under `(server, user)`.
    pub fn lookup(&self, server: &str, user: &str) -> Option<String> {
        self.load_all()
            .into_iter()
            .find(|r| r.is_keyed_by(server, user))
            .map(|r| r.value)
    }

    /// Install `value` under `(server, user)`, replacing any existing
    /// record for that key pair. A blank value deletes the entry instead;
    /// an empty string is never stored.
    pub fn save(&self, server: &str, user: &str, value: &str) -> Result<(), StoreError> {
        let _lock = FileLock::acquire(&self.path, &self.lock)?;

        let mut kept: Vec<AuthRecord> = self
            .load_all()
            .into_iter()
            .filter(|r| !r.is_keyed_by(server, user))
            .collect();
        if !value.trim().is_empty() {
            kept.push(AuthRecord::new(server, user, value));
        }

        let mut content = kept
            .iter()
            .map(AuthRecord::render)
            .collect::<Vec<_>>()
            .join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the record under `(server, user)` if present.
    pub fn delete(&self, server: &str, user: &str) -> Result<(), StoreError> {
        self.save(server, user, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> RecordStore {
        RecordStore::new(
            tmp.path().join("tickets"),
            LockParams {
                tries: 3,
                delay_ms: 5,
                wait_ms: 50,
            },
        )
    }

    #[test]
    fn install_then_lookup_then_remove() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save("srv:1666", "alice", "tok1").unwrap();
        assert_eq!(store.lookup("srv:1666", "alice").as_deref(), Some("tok1"));

        store.delete("srv:1666", "alice").unwrap();
        assert_eq!(store.lookup("srv:1666", "alice"), None);
    }

    #[test]
    fn save_replaces_existing_record_for_key_pair() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save("srv:1666", "alice", "old").unwrap();
        store.save("srv:1666", "alice", "new").unwrap();

        let all = store.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "new");
    }

    #[test]
    fn blank_value_deletes_never_stores_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save("srv:1666", "alice", "tok").unwrap();
        store.save("srv:1666", "alice", "  ").unwrap();
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save("srv:1666", "alice", "a").unwrap();
        store.save("srv:1666", "bob", "b").unwrap();
        store.save("10.0.0.1:1666", "alice", "c").unwrap();

        assert_eq!(store.lookup("srv:1666", "alice").as_deref(), Some("a"));
        assert_eq!(store.lookup("srv:1666", "bob").as_deref(), Some("b"));
        assert_eq!(store.lookup("10.0.0.1:1666", "alice").as_deref(), Some("c"));
    }

    #[test]
    fn missing_file_is_empty_store() {
        let tmp = TempDir::new().unwrap();
        assert!(store(&tmp).load_all().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        std::fs::write(store.path(), "garbage line\nsrv:1666=alice:tok\n").unwrap();

        let all = store.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user, "alice");
    }

    #[test]
    fn save_fails_while_lock_is_held() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let _held = FileLock::acquire(store.path(), &store.lock).unwrap();
        let result = store.save("srv:1666", "alice", "tok");
        assert!(matches!(result, Err(StoreError::Lock(_))));
    }
}
