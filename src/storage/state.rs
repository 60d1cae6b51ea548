//! Persisted documents and the repository trait

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diversity::DiversityWindow;
use crate::models::Fingerprint;
use crate::scheduler::PostingHistory;

use super::error::StorageError;
use super::lock::StoreLock;

/// Current on-disk document version
pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEDULE_DOCUMENT: &str = "posting_schedule";
pub const DIVERSITY_DOCUMENT: &str = "content_diversity";

// ============================================================================
// Documents
// ============================================================================

/// Scheduler-owned document: active pattern and posting history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    pub version: u32,

    /// Bumped on every committed change
    pub revision: u64,

    /// Active pattern; `None` means the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub records: PostingHistory,
}

impl Default for ScheduleDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            revision: 0,
            pattern: None,
            records: PostingHistory::new(),
        }
    }
}

/// Tracker-owned document: the rolling diversity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityDocument {
    pub version: u32,
    pub revision: u64,

    #[serde(default)]
    pub entries: DiversityWindow,
}

impl Default for DiversityDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            revision: 0,
            entries: DiversityWindow::new(),
        }
    }
}

/// Revisions a caller saw when it loaded state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateRevision {
    pub schedule: u64,
    pub diversity: u64,
}

/// Everything that survives between invocations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub schedule: ScheduleDocument,
    pub diversity: DiversityDocument,
}

impl PersistedState {
    pub fn revision(&self) -> StateRevision {
        StateRevision {
            schedule: self.schedule.revision,
            diversity: self.diversity.revision,
        }
    }

    /// Every published body on record: the diversity window plus
    /// successes that have aged out of it
    pub fn published_fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.diversity
            .entries
            .fingerprints()
            .chain(self.schedule.records.published_fingerprints())
    }

    /// Mark the schedule document as changed
    pub fn touch_schedule(&mut self) {
        self.schedule.revision += 1;
    }

    /// Mark the diversity document as changed
    pub fn touch_diversity(&mut self) {
        self.diversity.revision += 1;
    }

    pub(crate) fn check_revision(&self, expected: StateRevision) -> Result<(), StorageError> {
        let found = self.revision();
        if found.schedule != expected.schedule {
            return Err(StorageError::Conflict {
                document: SCHEDULE_DOCUMENT,
                expected: expected.schedule,
                found: found.schedule,
            });
        }
        if found.diversity != expected.diversity {
            return Err(StorageError::Conflict {
                document: DIVERSITY_DOCUMENT,
                expected: expected.diversity,
                found: found.diversity,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Load results
// ============================================================================

/// Recoverable problem found while loading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageWarning {
    /// Nothing stored yet; normal on first run
    Missing { document: String },

    /// Stored bytes could not be read or parsed
    Corrupt { document: String, detail: String },

    /// Written by an incompatible version
    UnsupportedVersion { document: String, found: u32 },
}

impl StorageWarning {
    /// Missing documents are expected and not worth surfacing as corruption
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn document(&self) -> &str {
        match self {
            Self::Missing { document }
            | Self::Corrupt { document, .. }
            | Self::UnsupportedVersion { document, .. } => document,
        }
    }
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { document } => write!(f, "{document}: not found, starting empty"),
            Self::Corrupt { document, detail } => {
                write!(f, "{document}: unreadable ({detail}), starting empty")
            }
            Self::UnsupportedVersion { document, found } => write!(
                f,
                "{document}: version {found} not supported (expected {SCHEMA_VERSION}), starting empty"
            ),
        }
    }
}

/// State plus whatever had to be recovered to produce it
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub state: PersistedState,
    pub warnings: Vec<StorageWarning>,
}

impl Loaded {
    /// Warnings that indicate lost or unreadable data
    pub fn degraded(&self) -> Vec<StorageWarning> {
        self.warnings
            .iter()
            .filter(|w| !w.is_informational())
            .cloned()
            .collect()
    }
}

// ============================================================================
// Repository trait
// ============================================================================

/// Durable home of [`PersistedState`]
///
/// Implementations must replace each document as a whole so a reader never
/// observes a partial write.
pub trait StateStore: Send + Sync {
    /// Read both documents, recovering corrupt ones as empty
    fn load(&self) -> Result<Loaded, StorageError>;

    /// Write both documents unconditionally
    fn save(&self, state: &PersistedState) -> Result<(), StorageError>;

    /// Write only if the stored revisions still equal `expected`
    fn save_if_unchanged(
        &self,
        state: &PersistedState,
        expected: StateRevision,
    ) -> Result<(), StorageError>;

    /// Take the advisory lock for a read-compute-write span
    fn lock(&self) -> Result<StoreLock, StorageError>;

    /// Where the state lives, for logs
    fn location(&self) -> String;
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Decode a stored document, falling back to its default on any problem
pub(crate) fn decode_document<T>(name: &str, raw: Option<&str>) -> (T, Option<StorageWarning>)
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(raw) = raw else {
        return (
            T::default(),
            Some(StorageWarning::Missing {
                document: name.to_string(),
            }),
        );
    };

    let corrupt = |detail: String| {
        (
            T::default(),
            Some(StorageWarning::Corrupt {
                document: name.to_string(),
                detail,
            }),
        )
    };

    match serde_json::from_str::<VersionHeader>(raw) {
        Ok(header) if header.version != SCHEMA_VERSION => (
            T::default(),
            Some(StorageWarning::UnsupportedVersion {
                document: name.to_string(),
                found: header.version,
            }),
        ),
        Ok(_) => match serde_json::from_str::<T>(raw) {
            Ok(doc) => (doc, None),
            Err(e) => corrupt(e.to_string()),
        },
        Err(e) => corrupt(e.to_string()),
    }
}

/// Canonical serialized form shared by every backend
pub(crate) fn encode_document<T: Serialize>(
    name: &'static str,
    doc: &T,
) -> Result<String, StorageError> {
    let mut text = serde_json::to_string_pretty(doc).map_err(|source| StorageError::Serialize {
        document: name,
        source,
    })?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_missing() {
        let (doc, warning): (ScheduleDocument, _) = decode_document(SCHEDULE_DOCUMENT, None);
        assert_eq!(doc, ScheduleDocument::default());
        assert!(warning.unwrap().is_informational());
    }

    #[test]
    fn test_decode_truncated() {
        let (doc, warning): (ScheduleDocument, _) =
            decode_document(SCHEDULE_DOCUMENT, Some(r#"{"version": 1, "revision": 4, "rec"#));
        assert_eq!(doc, ScheduleDocument::default());
        assert!(matches!(warning, Some(StorageWarning::Corrupt { .. })));
    }

    #[test]
    fn test_decode_future_version() {
        let (doc, warning): (DiversityDocument, _) =
            decode_document(DIVERSITY_DOCUMENT, Some(r#"{"version": 7, "revision": 1}"#));
        assert_eq!(doc.revision, 0);
        assert_eq!(
            warning,
            Some(StorageWarning::UnsupportedVersion {
                document: DIVERSITY_DOCUMENT.to_string(),
                found: 7
            })
        );
    }

    #[test]
    fn test_decode_valid() {
        let (doc, warning): (ScheduleDocument, _) = decode_document(
            SCHEDULE_DOCUMENT,
            Some(r#"{"version": 1, "revision": 9, "pattern": "active", "records": []}"#),
        );
        assert!(warning.is_none());
        assert_eq!(doc.revision, 9);
        assert_eq!(doc.pattern.as_deref(), Some("active"));
    }

    #[test]
    fn test_check_revision() {
        let mut state = PersistedState::default();
        let seen = state.revision();
        assert!(state.check_revision(seen).is_ok());
        state.touch_diversity();
        let err = state.check_revision(seen).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                document: DIVERSITY_DOCUMENT,
                ..
            }
        ));
    }
}
