//! Persisted state shared across invocations
//!
//! Two documents survive between runs: the posting schedule (active pattern
//! and history) and the content diversity window. Both sit behind the
//! [`StateStore`] trait so the medium can change without touching the
//! decision logic.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 PostingDesk                  │
//! └──────────────────────────────────────────────┘
//!                        │ load / save_if_unchanged / lock
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │                  StateStore                  │
//! └──────────────────────────────────────────────┘
//!              │                        │
//!              ▼                        ▼
//!   ┌────────────────────┐   ┌────────────────────┐
//!   │   JsonStateStore   │   │  SqliteStateStore  │
//!   │ temp file + rename │   │  one transaction   │
//!   └────────────────────┘   └────────────────────┘
//! ```

pub mod error;
pub mod json;
pub mod lock;
pub mod sqlite;
pub mod state;

pub use error::StorageError;
pub use json::JsonStateStore;
pub use lock::StoreLock;
pub use sqlite::SqliteStateStore;
pub use state::{
    DiversityDocument, Loaded, PersistedState, ScheduleDocument, StateRevision, StateStore,
    StorageWarning, DIVERSITY_DOCUMENT, SCHEDULE_DOCUMENT, SCHEMA_VERSION,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Storage medium
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend '{other}' (json, sqlite)")),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Longest accepted stale-lock limit: one week
pub const MAX_LOCK_STALE_SECS: u64 = 7 * 24 * 60 * 60;

/// Where and how state is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,

    /// Directory holding the JSON documents or the database file
    pub data_dir: PathBuf,

    /// Database file name under `data_dir` for the sqlite backend
    pub sqlite_file: String,

    /// Seconds after which an abandoned lock may be taken over; must
    /// outlast the longest cycle
    pub lock_stale_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            data_dir: PathBuf::from("./data"),
            sqlite_file: "pacer.db".to_string(),
            lock_stale_secs: 1800,
        }
    }
}

impl StorageSettings {
    pub fn lock_stale_after(&self) -> chrono::Duration {
        let secs = self.lock_stale_secs.min(MAX_LOCK_STALE_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("storage.data_dir must not be empty".to_string());
        }
        if self.backend == StorageBackend::Sqlite && self.sqlite_file.trim().is_empty() {
            return Err("storage.sqlite_file must not be empty".to_string());
        }
        if self.lock_stale_secs == 0 {
            return Err("storage.lock_stale_secs must be greater than 0".to_string());
        }
        if self.lock_stale_secs > MAX_LOCK_STALE_SECS {
            return Err(format!(
                "storage.lock_stale_secs must be at most {MAX_LOCK_STALE_SECS}"
            ));
        }
        Ok(())
    }
}

/// Open the configured backend
pub fn open_store(settings: &StorageSettings) -> Result<Box<dyn StateStore>, StorageError> {
    let stale = settings.lock_stale_after();
    let store: Box<dyn StateStore> = match settings.backend {
        StorageBackend::Json => Box::new(JsonStateStore::new(&settings.data_dir, stale)),
        StorageBackend::Sqlite => Box::new(SqliteStateStore::open(
            settings.data_dir.join(&settings.sqlite_file),
            stale,
        )?),
    };
    tracing::debug!(backend = %settings.backend, location = %store.location(), "State store ready");
    Ok(store)
}
