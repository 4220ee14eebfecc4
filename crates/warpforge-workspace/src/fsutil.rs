//! Atomic writes and advisory lockfiles.
//!
//! Every mutation of persisted state goes through [`write_atomic`]: bytes land
//! in an exclusively-created temp file in the destination directory, then a
//! single rename makes them visible. Cancellation mid-write leaves only a
//! temp file behind; no partial rename is ever observable.

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::IoSnafu;
use crate::error::Result;

/// How long to wait for a contended lockfile before giving up.
const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// Poll interval while waiting for a lockfile.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_name_for(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    path.with_file_name(format!(".{file_name}.tmp-{}-{n}", std::process::id()))
}

/// Write `bytes` to `path` atomically, creating parent directories as needed.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.context(IoSnafu {
            context: "could not create directory",
            path: parent.to_path_buf(),
        })?;
    }

    let temp_path = temp_name_for(path);
    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .context(IoSnafu {
                context: "could not create temp file",
                path: temp_path.clone(),
            })?;
        file.write_all(bytes).await.context(IoSnafu {
            context: "could not write temp file",
            path: temp_path.clone(),
        })?;
        file.sync_all().await.context(IoSnafu {
            context: "could not sync temp file",
            path: temp_path.clone(),
        })?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await.context(IoSnafu {
            context: "could not move file into place",
            path: path.to_path_buf(),
        })
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

/// An advisory lock held as long as the guard lives.
///
/// Acquisition is an exclusive create of the lock path; contention is resolved
/// by polling. The file is removed on drop. Locks are per-catalog (mutations)
/// and per-formula-id (memo dir), which keeps concurrent executions of the
/// same formula down to one.
#[derive(Debug)]
pub struct Lockfile {
    path: PathBuf,
}

impl Lockfile {
    /// Acquire the lock at `path`, waiting up to a bounded timeout.
    pub async fn acquire(path: PathBuf) -> Result<Lockfile> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context(IoSnafu {
                context: "could not create lock directory",
                path: parent.to_path_buf(),
            })?;
        }

        let deadline = tokio::time::Instant::now() + LOCK_ACQUIRE_TIMEOUT;
        loop {
            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(_) => return Ok(Lockfile { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(err).context(IoSnafu {
                            context: "timed out waiting for lock",
                            path,
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(err) => {
                    return Err(err).context(IoSnafu {
                        context: "could not create lock file",
                        path,
                    });
                }
            }
        }
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
        }
    }
}
