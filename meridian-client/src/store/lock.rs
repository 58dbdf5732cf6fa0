//! Scoped advisory lock for the shared credential files.
//!
//! Multiple client processes may mutate the same tickets/trust file, so
//! every write is serialized through a sidecar lock file
//! (`<file>.lck`), acquired with create-exclusive semantics and a
//! bounded retry loop. The lock is released on `Drop`.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::warn;

use crate::config::LockParams;

const LOCK_SUFFIX: &str = "lck";

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Retries and wait budget exhausted while another process held the
    /// lock.
    #[error("timed out waiting for lock on {path}")]
    Timeout { path: PathBuf },

    #[error("lock I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A held advisory lock. Dropping it removes the sidecar file.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquire the lock protecting `target`, retrying per `params`.
    ///
    /// Each attempt tries to create `<target>.lck` exclusively; an
    /// existing file means another process holds the lock. Gives up when
    /// either the attempt count or the total wait budget is exhausted.
    pub fn acquire(target: &Path, params: &LockParams) -> Result<Self, LockError> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: lock_path.clone(),
                source,
            })?;
        }

        let deadline = Instant::now() + params.wait();
        let tries = params.tries.max(1);
        for attempt in 1..=tries {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt == tries || Instant::now() >= deadline {
                        return Err(LockError::Timeout { path: lock_path });
                    }
                    std::thread::sleep(params.delay());
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: lock_path,
                        source,
                    })
                }
            }
        }
        Err(LockError::Timeout { path: lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to release credential file lock");
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(LOCK_SUFFIX);
    target.with_file_name(name)
}
