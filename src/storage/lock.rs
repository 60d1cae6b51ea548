//! Advisory lock file held across a read-compute-write span

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::StorageError;

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    owner: Uuid,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Exclusive lock released on drop
///
/// A lock older than the stale limit is assumed to belong to a crashed
/// invocation and is taken over. Long holders call [`StoreLock::refresh`]
/// to stay fresh.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    owner: Uuid,
}

impl StoreLock {
    pub fn acquire(path: impl AsRef<Path>, stale_after: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_info(&path);
                let stale = match &holder {
                    Some(info) => Utc::now() - info.acquired_at > stale_after,
                    // Unreadable lock: judge by file age
                    None => file_age(&path).is_some_and(|age| age > stale_after),
                };

                if !stale {
                    return Err(match holder {
                        Some(info) => StorageError::LockHeld {
                            path,
                            holder: format!("pid {} ({})", info.pid, info.owner),
                            since: info.acquired_at.to_rfc3339(),
                        },
                        None => StorageError::LockHeld {
                            path,
                            holder: "unknown".to_string(),
                            since: "unknown".to_string(),
                        },
                    });
                }

                tracing::warn!(
                    path = %path.display(),
                    holder = ?holder.as_ref().map(|h| h.pid),
                    "Taking over stale state lock"
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::io(&path, e)),
                }
                Self::try_create(&path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        StorageError::LockHeld {
                            path: path.clone(),
                            holder: "concurrent takeover".to_string(),
                            since: Utc::now().to_rfc3339(),
                        }
                    } else {
                        StorageError::io(&path, e)
                    }
                })
            }
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    fn try_create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let info = LockInfo {
            owner: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_string(&info).map_err(io::Error::other)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), owner = %info.owner, "State lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            owner: info.owner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the lock is still ours and restart its stale clock
    ///
    /// Fails with [`StorageError::LockLost`] once another invocation has
    /// taken the lock over.
    pub fn refresh(&self) -> Result<(), StorageError> {
        let ours = read_info(&self.path).is_some_and(|info| info.owner == self.owner);
        if !ours {
            tracing::warn!(path = %self.path.display(), owner = %self.owner, "State lock lost");
            return Err(StorageError::LockLost {
                path: self.path.clone(),
            });
        }

        let info = LockInfo {
            owner: self.owner,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_string(&info).map_err(|e| StorageError::io(&self.path, io::Error::other(e)))?;

        // Replace by rename so a contender never reads a half-written file
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(format!(".{}.tmp", self.owner.simple()));
        let temp_path = PathBuf::from(temp_path);
        fs::write(&temp_path, body).map_err(|e| StorageError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StorageError::io(&self.path, e))?;

        tracing::trace!(path = %self.path.display(), "State lock refreshed");
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Leave the file alone if someone took it over
        let ours = read_info(&self.path).is_some_and(|info| info.owner == self.owner);
        if ours {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
            }
        }
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let elapsed = modified.elapsed().ok()?;
    Duration::from_std(elapsed).ok()
}
