//! pacer - posting cadence, content diversity and spam gating
//!
//! Decides when a generated post may go out and whether a candidate is fit to
//! publish, given what was attempted and published before. State lives in a
//! small persisted store so every invocation can be independent.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`pattern`] - Named posting patterns (spacing, caps, hours, skips)
//! - [`scheduler`] - Eligibility decisions over attempt history
//! - [`diversity`] - Topic, keyword and style variety scoring
//! - [`quality`] - Spam phrase normalization and quality verdicts
//! - [`storage`] - Persisted state (JSON files or SQLite)
//! - [`desk`] - Operator API and the generate/publish cycle
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use pacer::config::Config;
//! use pacer::desk::PostingDesk;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let desk = PostingDesk::from_config(&config)?;
//!     let status = desk.status(chrono::Utc::now())?;
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod desk;
pub mod diversity;
pub mod error;
pub mod models;
pub mod outcome;
pub mod pattern;
pub mod quality;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::desk::{ContentSource, CycleOutcome, CycleSettings, PostingDesk, PublishTarget};
    pub use crate::diversity::DiversityTracker;
    pub use crate::error::{Error, ErrorCategory, PacerErrorTrait, Result};
    pub use crate::models::{AttemptOutcome, ContentCandidate, Fingerprint, PostingRecord};
    pub use crate::outcome::Outcome;
    pub use crate::pattern::{PatternSet, PostingPattern};
    pub use crate::quality::QualityGate;
    pub use crate::scheduler::{Decision, PostingHistory, PostingScheduler, RngDraw};
    pub use crate::storage::{JsonStateStore, SqliteStateStore, StateStore};
}

// Direct re-exports for convenience
pub use models::{AttemptOutcome, ContentCandidate, PostingRecord};
