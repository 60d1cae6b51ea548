//! Error types for the storage layer

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing persisted state
///
/// Unreadable or corrupt documents are not errors: they load as empty state
/// with a [`StorageWarning`](super::StorageWarning).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document could not be serialized
    #[error("Failed to serialize {document}: {source}")]
    Serialize {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Another writer changed the document since it was loaded
    #[error("Concurrent modification of {document}: expected revision {expected}, found {found}")]
    Conflict {
        document: &'static str,
        expected: u64,
        found: u64,
    },

    /// The advisory lock is held by another invocation
    #[error("State is locked by {holder} (since {since}); lock file {}", path.display())]
    LockHeld {
        path: PathBuf,
        holder: String,
        since: String,
    },

    /// The lock was taken over while this invocation still needed it
    #[error("Lost state lock {} to another invocation", path.display())]
    LockLost { path: PathBuf },

    /// Fresh state no longer allows the write this invocation computed
    #[error("State changed underneath: {detail}")]
    Superseded { detail: String },

    /// A previous holder of the connection panicked
    #[error("Storage connection poisoned")]
    Poisoned,
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Conflicts and lock contention clear up on their own
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::LockHeld { .. } | Self::LockLost { .. } => true,
            Self::Superseded { .. } => true,
            Self::Io { .. } => true,
            Self::Serialize { .. } | Self::Database(_) | Self::Poisoned => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_lock_held(&self) -> bool {
        matches!(self, Self::LockHeld { .. })
    }

    /// Another invocation got in the way
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::LockHeld { .. } | Self::LockLost { .. } | Self::Superseded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_recoverable() {
        let err = StorageError::Conflict {
            document: "posting_schedule",
            expected: 3,
            found: 4,
        };
        assert!(err.is_recoverable());
        assert!(err.is_conflict());
        assert!(err.to_string().contains("expected revision 3"));
    }

    #[test]
    fn test_contention_kinds() {
        let lost = StorageError::LockLost {
            path: PathBuf::from("/tmp/.pacer.lock"),
        };
        assert!(lost.is_contention());
        assert!(!lost.is_conflict());
        assert!(StorageError::Superseded {
            detail: "daily limit reached".to_string()
        }
        .is_contention());
        assert!(!StorageError::Poisoned.is_contention());
    }

    #[test]
    fn test_io_error_display_includes_path() {
        let err = StorageError::io(
            "/tmp/state.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/state.json"));
    }
}
