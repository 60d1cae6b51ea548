//! SQLite backend
//!
//! Both documents are stored as JSON text in a single `documents` table and
//! replaced inside one transaction.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::StorageError;
use super::lock::StoreLock;
use super::state::{
    decode_document, encode_document, DiversityDocument, Loaded, PersistedState,
    ScheduleDocument, StateRevision, StateStore, DIVERSITY_DOCUMENT, SCHEDULE_DOCUMENT,
};

/// State documents in a SQLite database file
#[derive(Debug)]
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    lock_stale_after: Duration,
}

impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>, lock_stale_after: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            lock_stale_after,
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite state store opened");
        Ok(store)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: std::env::temp_dir().join(format!("pacer-{}.db", uuid::Uuid::new_v4())),
            lock_stale_after: Duration::minutes(10),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS documents (
                    name TEXT PRIMARY KEY,
                    version INTEGER NOT NULL,
                    revision INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
        )?;
        Ok(())
    }

    fn read_body(conn: &Connection, name: &str) -> Result<Option<String>, StorageError> {
        Ok(conn
            .query_row("SELECT body FROM documents WHERE name = ?1", params![name], |row| {
                row.get::<_, String>(0)
            })
            .optional()?)
    }

    fn read_state(conn: &Connection) -> Result<Loaded, StorageError> {
        let schedule_raw = Self::read_body(conn, SCHEDULE_DOCUMENT)?;
        let diversity_raw = Self::read_body(conn, DIVERSITY_DOCUMENT)?;

        let (schedule, schedule_warning): (ScheduleDocument, _) =
            decode_document(SCHEDULE_DOCUMENT, schedule_raw.as_deref());
        let (diversity, diversity_warning): (DiversityDocument, _) =
            decode_document(DIVERSITY_DOCUMENT, diversity_raw.as_deref());

        Ok(Loaded {
            state: PersistedState {
                schedule,
                diversity,
            },
            warnings: schedule_warning.into_iter().chain(diversity_warning).collect(),
        })
    }

    fn write_state(conn: &Connection, state: &PersistedState) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let docs = [
            (
                SCHEDULE_DOCUMENT,
                state.schedule.version,
                state.schedule.revision,
                encode_document(SCHEDULE_DOCUMENT, &state.schedule)?,
            ),
            (
                DIVERSITY_DOCUMENT,
                state.diversity.version,
                state.diversity.revision,
                encode_document(DIVERSITY_DOCUMENT, &state.diversity)?,
            ),
        ];

        for (name, version, revision, body) in docs {
            conn.execute(
                r#"
                INSERT INTO documents (name, version, revision, body, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    version = excluded.version,
                    revision = excluded.revision,
                    body = excluded.body,
                    updated_at = excluded.updated_at
                "#,
                params![name, version, revision as i64, body, now],
            )?;
        }
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<Loaded, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let loaded = Self::read_state(&conn)?;
        for warning in loaded.warnings.iter().filter(|w| !w.is_informational()) {
            tracing::warn!(path = %self.path.display(), warning = %warning, "Recovered unreadable state");
        }
        Ok(loaded)
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction()?;
        Self::write_state(&tx, state)?;
        tx.commit()?;
        tracing::debug!(path = %self.path.display(), "State saved");
        Ok(())
    }

    fn save_if_unchanged(
        &self,
        state: &PersistedState,
        expected: StateRevision,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::read_state(&tx)?.state.check_revision(expected)?;
        Self::write_state(&tx, state)?;
        tx.commit()?;
        tracing::debug!(path = %self.path.display(), "State saved");
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock, StorageError> {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        StoreLock::acquire(PathBuf::from(lock_path), self.lock_stale_after)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptOutcome, PostingRecord};
    use chrono::TimeZone;

    #[test]
    fn test_empty_database_loads_empty() {
        let store = SqliteStateStore::in_memory().unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.state, PersistedState::default());
        assert!(loaded.degraded().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let store = SqliteStateStore::in_memory().unwrap();
        let mut state = PersistedState::default();
        state.schedule.records.push(
            PostingRecord::new(
                Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap(),
                AttemptOutcome::Failed,
            )
            .with_note("publish timed out"),
        );
        state.touch_schedule();
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap().state, state);
    }

    #[test]
    fn test_conflict_leaves_stored_state() {
        let store = SqliteStateStore::in_memory().unwrap();
        let seen = store.load().unwrap().state;

        let mut first = seen.clone();
        first.schedule.pattern = Some("active".to_string());
        first.touch_schedule();
        store.save_if_unchanged(&first, seen.revision()).unwrap();

        let mut second = seen.clone();
        second.schedule.pattern = Some("conservative".to_string());
        second.touch_schedule();
        assert!(store.save_if_unchanged(&second, seen.revision()).unwrap_err().is_conflict());

        let stored = store.load().unwrap().state;
        assert_eq!(stored.schedule.pattern.as_deref(), Some("active"));
    }

    #[test]
    fn test_corrupt_row_recovers() {
        let store = SqliteStateStore::in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO documents (name, version, revision, body, updated_at) VALUES (?1, 1, 1, ?2, ?3)",
                params![DIVERSITY_DOCUMENT, "[[[", "2024-01-01T00:00:00Z"],
            )
            .unwrap();
        }
        let loaded = store.load().unwrap();
        assert_eq!(loaded.degraded().len(), 1);
        assert_eq!(loaded.state.diversity, DiversityDocument::default());
    }
}
