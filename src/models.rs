//! Core data structures shared by the scheduler, the diversity tracker and
//! the quality gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::utils::canonical_text;

/// Keyword set attached to records and candidates
///
/// Ordered so persisted documents serialize identically on every save.
pub type KeywordSet = BTreeSet<String>;

// ============================================================================
// Fingerprint
// ============================================================================

/// Stable SHA-256 summary of canonicalized content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a piece of text after stripping markup, case and spacing
    pub fn of_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_text(text).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an already computed digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs and reports
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Posting Records
// ============================================================================

/// Terminal outcome of a posting opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// Content was published
    Succeeded,
    /// Publishing was attempted (or aborted after rejections) and failed
    Failed,
    /// Policy chose not to post; observability only
    Skipped,
}

impl AttemptOutcome {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Succeeded and Failed are attempts; Skipped is not
    pub fn is_terminal_attempt(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Immutable entry of the posting history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    /// When the outcome was decided
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub outcome: AttemptOutcome,

    /// Topic category of the content involved (empty for skips)
    #[serde(default)]
    pub category: String,

    /// Keywords of the content involved
    #[serde(default)]
    pub keywords: KeywordSet,

    /// Fingerprint of the normalized body, when content existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,

    /// Title of the content, when content existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Failure or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Pattern active when the record was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl PostingRecord {
    /// Create a record with no content attached
    pub fn new(timestamp: DateTime<Utc>, outcome: AttemptOutcome) -> Self {
        Self {
            timestamp,
            outcome,
            category: String::new(),
            keywords: KeywordSet::new(),
            fingerprint: None,
            title: None,
            note: None,
            pattern: None,
        }
    }

    /// Attach the content that was attempted
    pub fn with_content(mut self, candidate: &ContentCandidate, fingerprint: Fingerprint) -> Self {
        self.category = candidate.category.clone();
        self.keywords = candidate.keywords.clone();
        self.title = Some(candidate.title.clone());
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_keywords(mut self, keywords: KeywordSet) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

// ============================================================================
// Content
// ============================================================================

/// Generated content awaiting a publish decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentCandidate {
    pub title: String,

    pub body: String,

    /// Topic category; derived from the title when empty
    #[serde(default)]
    pub category: String,

    /// Keywords; extracted from the text when empty
    #[serde(default)]
    pub keywords: KeywordSet,

    #[serde(default)]
    pub writing_style: String,

    #[serde(default)]
    pub angle: String,
}

impl ContentCandidate {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.writing_style = style.into();
        self
    }

    pub fn with_angle(mut self, angle: impl Into<String>) -> Self {
        self.angle = angle.into();
        self
    }
}

/// Summary of a published item kept in the diversity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub title: String,

    pub category: String,

    #[serde(default)]
    pub keywords: KeywordSet,

    #[serde(default)]
    pub writing_style: String,

    #[serde(default)]
    pub angle: String,

    pub fingerprint: Fingerprint,

    /// Character count of the published body
    #[serde(default)]
    pub body_chars: usize,
}

impl DiversityEntry {
    /// Summarize an accepted candidate
    pub fn from_candidate(
        candidate: &ContentCandidate,
        fingerprint: Fingerprint,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            title: candidate.title.clone(),
            category: candidate.category.clone(),
            keywords: candidate.keywords.clone(),
            writing_style: candidate.writing_style.clone(),
            angle: candidate.angle.clone(),
            fingerprint,
            body_chars: candidate.body.chars().count(),
        }
    }
}
