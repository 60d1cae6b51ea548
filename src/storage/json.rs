//! JSON file backend
//!
//! Each document lives in its own pretty-printed file. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader sees either the old or the new document, never a mix.

use chrono::Duration;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::StorageError;
use super::lock::StoreLock;
use super::state::{
    decode_document, encode_document, DiversityDocument, Loaded, PersistedState,
    ScheduleDocument, StateRevision, StateStore, StorageWarning, DIVERSITY_DOCUMENT,
    SCHEDULE_DOCUMENT,
};

const LOCK_FILE: &str = ".pacer.lock";

/// Two JSON documents in a data directory
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
    lock_stale_after: Duration,
}

impl JsonStateStore {
    pub fn new(dir: impl AsRef<Path>, lock_stale_after: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock_stale_after,
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.dir.join(format!("{SCHEDULE_DOCUMENT}.json"))
    }

    pub fn diversity_path(&self) -> PathBuf {
        self.dir.join(format!("{DIVERSITY_DOCUMENT}.json"))
    }

    /// File contents, `None` when absent; other read errors surface as text
    /// that fails to parse so they recover like corruption
    fn read(path: &Path) -> Result<Option<String>, String> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    fn load_one<T>(&self, name: &str, path: &Path) -> (T, Option<StorageWarning>)
    where
        T: Default + for<'de> serde::Deserialize<'de>,
    {
        match Self::read(path) {
            Ok(raw) => decode_document(name, raw.as_deref()),
            Err(detail) => (
                T::default(),
                Some(StorageWarning::Corrupt {
                    document: name.to_string(),
                    detail,
                }),
            ),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.dir.join(format!("{file_name}.{}.tmp", std::process::id()));

        let file = File::create(&temp_path).map_err(|e| StorageError::io(&temp_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(contents.as_bytes())
            .map_err(|e| StorageError::io(&temp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(&temp_path, e.into_error()))?;
        file.sync_all().map_err(|e| StorageError::io(&temp_path, e))?;

        fs::rename(&temp_path, path).map_err(|e| StorageError::io(path, e))?;
        Ok(())
    }

    fn write_state(&self, state: &PersistedState) -> Result<(), StorageError> {
        let schedule = encode_document(SCHEDULE_DOCUMENT, &state.schedule)?;
        let diversity = encode_document(DIVERSITY_DOCUMENT, &state.diversity)?;
        // Schedule first: caps and published fingerprints are read from it,
        // so a crash between the renames can only lose a diversity entry
        self.write_atomic(&self.schedule_path(), &schedule)?;
        self.write_atomic(&self.diversity_path(), &diversity)?;

        tracing::debug!(
            dir = %self.dir.display(),
            schedule_revision = state.schedule.revision,
            diversity_revision = state.diversity.revision,
            "State saved"
        );
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Loaded, StorageError> {
        let (schedule, schedule_warning): (ScheduleDocument, _) =
            self.load_one(SCHEDULE_DOCUMENT, &self.schedule_path());
        let (diversity, diversity_warning): (DiversityDocument, _) =
            self.load_one(DIVERSITY_DOCUMENT, &self.diversity_path());

        let warnings: Vec<_> = schedule_warning.into_iter().chain(diversity_warning).collect();
        for warning in warnings.iter().filter(|w| !w.is_informational()) {
            tracing::warn!(dir = %self.dir.display(), warning = %warning, "Recovered unreadable state");
        }

        Ok(Loaded {
            state: PersistedState {
                schedule,
                diversity,
            },
            warnings,
        })
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        self.write_state(state)
    }

    fn save_if_unchanged(
        &self,
        state: &PersistedState,
        expected: StateRevision,
    ) -> Result<(), StorageError> {
        let current = self.load()?;
        current.state.check_revision(expected)?;
        self.write_state(state)
    }

    fn lock(&self) -> Result<StoreLock, StorageError> {
        StoreLock::acquire(self.dir.join(LOCK_FILE), self.lock_stale_after)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
