//! Posting eligibility scheduler
//!
//! Decides whether a post may go out now, predicts the next slot at which it
//! could, and appends outcomes to the posting history. The scheduler holds
//! no state of its own: history and the active pattern are passed into every
//! call and persistence happens at the storage boundary.
//!
//! # Overview
//!
//! ```text
//!   now ──► spacing ──► daily cap ──► weekly cap ──► hours ──► skip draw ──► Eligible
//!              │            │             │            │           │
//!              ▼            ▼             ▼            ▼           ▼
//!          Blocked      Blocked       Blocked      Blocked      Skipped
//! ```
//!
//! Spacing is widened by [`BackoffPolicy`] when recent attempts fail, so
//! failure history feeds back into cadence and not only success history.
//!
//! # Quick Start
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use pacer::pattern::PostingPattern;
//! use pacer::scheduler::{FixedDraw, PostingHistory, PostingScheduler};
//!
//! let scheduler = PostingScheduler::default();
//! let now = Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap();
//! let decision = scheduler.evaluate(
//!     now,
//!     &PostingHistory::new(),
//!     &PostingPattern::moderate(),
//!     &mut FixedDraw::never_skip(),
//! );
//! assert!(decision.is_eligible());
//! ```

pub mod backoff;
pub mod draw;
pub mod eligibility;
pub mod history;

pub use backoff::{BackoffPolicy, BackoffState};
pub use draw::{FixedDraw, RngDraw, UnitDraw};
pub use eligibility::{BlockReason, Decision, PostingScheduler, SkipReason};
pub use history::{PostingHistory, PostingStats};

use crate::models::PostingRecord;

impl PostingScheduler {
    /// Append an outcome to the history
    ///
    /// Blocked evaluations are not attempts and must never reach this call.
    pub fn record_attempt<'h>(
        &self,
        history: &'h mut PostingHistory,
        record: PostingRecord,
    ) -> &'h PostingHistory {
        tracing::info!(
            outcome = %record.outcome,
            category = %record.category,
            fingerprint = record.fingerprint.as_ref().map(|f| f.short()).unwrap_or("-"),
            note = record.note.as_deref().unwrap_or(""),
            "Recording posting outcome"
        );
        history.push(record);
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttemptOutcome;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_record_attempt_appends() {
        let scheduler = PostingScheduler::default();
        let mut history = PostingHistory::new();
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();

        scheduler.record_attempt(
            &mut history,
            PostingRecord::new(ts, AttemptOutcome::Succeeded).with_category("technology"),
        );
        scheduler.record_attempt(
            &mut history,
            PostingRecord::new(ts, AttemptOutcome::Skipped).with_note("randomized"),
        );

        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[1].outcome, AttemptOutcome::Skipped);
    }
}
