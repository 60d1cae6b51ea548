//! Operator API over persisted state
//!
//! [`PostingDesk`] wires the scheduler, diversity tracker and quality gate to
//! a [`StateStore`]. Every operation loads state, computes, and (for
//! mutations) writes back under the advisory lock with a revision check.

pub mod collaborator;
pub mod command;
pub mod cycle;

pub use collaborator::{
    CollaboratorError, ContentSource, GenerationHint, PublishReceipt, PublishTarget,
};
pub use command::{CommandLine, CommandSource, CommandTarget};
pub use cycle::{CycleOutcome, CycleReport, CycleSettings};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::config::Config;
use crate::diversity::{DiversityReport, DiversityTracker};
use crate::error::{Error, Result};
use crate::models::PostingRecord;
use crate::outcome::Outcome;
use crate::pattern::{PatternSet, PostingPattern};
use crate::quality::{QualityGate, QualityVerdict};
use crate::scheduler::{BackoffState, Decision, FixedDraw, PostingScheduler, PostingStats};
use crate::storage::{open_store, Loaded, PersistedState, StateStore, StorageWarning, StoreLock};

/// Pause before the single retry of a held lock
pub(crate) const LOCK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Snapshot of scheduling state for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub pattern: PostingPattern,

    /// Decision as if evaluated now, with the natural skip left out
    pub decision: Decision,

    pub next_suggested_time: DateTime<Utc>,

    pub stats: PostingStats,

    pub backoff: BackoffState,
}

/// What a reset removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetSummary {
    pub cleared_records: usize,
    pub cleared_entries: usize,

    /// Pattern active after the reset
    pub pattern: String,
}

/// Decision components bound to one state store
pub struct PostingDesk {
    store: Box<dyn StateStore>,
    patterns: PatternSet,
    scheduler: PostingScheduler,
    tracker: DiversityTracker,
    gate: QualityGate,
}

impl PostingDesk {
    pub fn new(
        store: Box<dyn StateStore>,
        patterns: PatternSet,
        scheduler: PostingScheduler,
        tracker: DiversityTracker,
        gate: QualityGate,
    ) -> Self {
        Self {
            store,
            patterns,
            scheduler,
            tracker,
            gate,
        }
    }

    /// Build every component from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let patterns = config.pattern_set()?;
        let gate = QualityGate::new(config.quality.clone())?;
        let store = open_store(&config.storage)?;
        Ok(Self::new(store, patterns, config.scheduler(), config.tracker(), gate))
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn scheduler(&self) -> &PostingScheduler {
        &self.scheduler
    }

    pub fn tracker(&self) -> &DiversityTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    // ========================================================================
    // Read-only operations
    // ========================================================================

    /// Pattern, decision, next slot, counters and backoff
    pub fn status(&self, now: DateTime<Utc>) -> Result<Outcome<StatusReport>> {
        let loaded = self.store.load()?;
        let history = &loaded.state.schedule.records;
        let pattern = self.active_pattern(&loaded.state).clone();

        let decision = self
            .scheduler
            .evaluate(now, history, &pattern, &mut FixedDraw::never_skip());
        let report = StatusReport {
            next_suggested_time: self.scheduler.next_suggested_time(now, history, &pattern),
            stats: history.stats(now, self.scheduler.timezone()),
            backoff: self.scheduler.backoff_state(history),
            decision,
            pattern,
        };
        Ok(Outcome::with_warnings(report, &loaded.warnings))
    }

    pub fn diversity_report(&self) -> Result<Outcome<DiversityReport>> {
        let loaded = self.store.load()?;
        let report = self.tracker.report(&loaded.state.diversity.entries);
        Ok(Outcome::with_warnings(report, &loaded.warnings))
    }

    /// The newest `limit` records, oldest first
    pub fn history(&self, limit: usize) -> Result<Outcome<Vec<PostingRecord>>> {
        let loaded = self.store.load()?;
        let records = loaded.state.schedule.records.recent(limit).to_vec();
        Ok(Outcome::with_warnings(records, &loaded.warnings))
    }

    /// Run the quality gate against everything already published
    pub fn quality_check(&self, title: &str, body: &str) -> Result<Outcome<QualityVerdict>> {
        let loaded = self.store.load()?;
        let verdict = self
            .gate
            .evaluate(title, body, loaded.state.published_fingerprints());
        Ok(Outcome::with_warnings(verdict, &loaded.warnings))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Switch the active pattern; history is untouched
    pub fn set_pattern(&self, name: &str) -> Result<Outcome<PostingPattern>> {
        let pattern = match self.patterns.resolve(name) {
            Ok(pattern) => pattern.clone(),
            Err(e) => return Ok(Outcome::invalid(e.to_string())),
        };

        let _lock = self.lock_state()?;
        let loaded = self.store.load()?;
        let (previous, warnings) = self.commit(loaded, |state| {
            let previous = self.active_pattern(state).name.clone();
            state.schedule.pattern = Some(pattern.name.clone());
            previous
        })?;

        tracing::info!(from = %previous, to = %pattern.name, "Posting pattern changed");
        Ok(Outcome::with_warnings(pattern, &warnings))
    }

    /// Clear history and the diversity window
    ///
    /// The active pattern survives unless `restore_default_pattern` is set.
    pub fn reset(&self, confirm: bool, restore_default_pattern: bool) -> Result<Outcome<ResetSummary>> {
        if !confirm {
            return Ok(Outcome::invalid("reset requires explicit confirmation"));
        }

        let _lock = self.lock_state()?;
        let loaded = self.store.load()?;
        let (summary, warnings) = self.commit(loaded, |state| {
            let cleared_records = state.schedule.records.len();
            let cleared_entries = state.diversity.entries.len();
            state.schedule.records.clear();
            state.diversity.entries.clear();
            if restore_default_pattern {
                state.schedule.pattern = None;
            }
            ResetSummary {
                cleared_records,
                cleared_entries,
                pattern: self.active_pattern(state).name.clone(),
            }
        })?;

        tracing::warn!(
            records = summary.cleared_records,
            entries = summary.cleared_entries,
            pattern = %summary.pattern,
            "Posting state reset"
        );
        Ok(Outcome::with_warnings(summary, &warnings))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Persisted pattern, or the configured default when unset or unknown
    pub(crate) fn active_pattern(&self, state: &PersistedState) -> &PostingPattern {
        match state.schedule.pattern.as_deref() {
            None => self.patterns.default_pattern(),
            Some(name) => self.patterns.resolve(name).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored pattern no longer configured, using default");
                self.patterns.default_pattern()
            }),
        }
    }

    /// Take the state lock, waiting once if another invocation holds it
    pub(crate) fn lock_state(&self) -> Result<StoreLock> {
        match self.store.lock() {
            Err(e) if e.is_lock_held() => {
                tracing::info!(error = %e, "State locked, retrying once");
                std::thread::sleep(LOCK_RETRY_DELAY);
                Ok(self.store.lock()?)
            }
            other => Ok(other?),
        }
    }

    /// Apply `change` to loaded state and write it back
    ///
    /// Changed documents get a new revision. A revision conflict reloads
    /// fresh state and applies `change` once more; a second conflict is
    /// returned to the caller.
    pub(crate) fn commit<T>(
        &self,
        loaded: Loaded,
        change: impl Fn(&mut PersistedState) -> T,
    ) -> Result<(T, Vec<StorageWarning>)> {
        self.commit_checked(loaded, |_| Ok(()), change)
    }

    /// [`commit`](Self::commit), with `still_valid` run against the fresh
    /// state before the retry so a change computed from stale state is not
    /// replayed blindly
    pub(crate) fn commit_checked<T>(
        &self,
        loaded: Loaded,
        still_valid: impl Fn(&PersistedState) -> Result<()>,
        change: impl Fn(&mut PersistedState) -> T,
    ) -> Result<(T, Vec<StorageWarning>)> {
        match self.try_commit(loaded.state, &change) {
            Ok(value) => Ok((value, loaded.warnings)),
            Err(Error::Storage(e)) if e.is_conflict() => {
                tracing::warn!(error = %e, "State changed underneath, retrying with fresh state");
                let fresh = self.store.load()?;
                still_valid(&fresh.state)?;
                let value = self.try_commit(fresh.state, &change)?;
                Ok((value, fresh.warnings))
            }
            Err(e) => Err(e),
        }
    }

    fn try_commit<T>(
        &self,
        mut state: PersistedState,
        change: &impl Fn(&mut PersistedState) -> T,
    ) -> Result<T> {
        let before = state.clone();
        let value = change(&mut state);

        let schedule_changed = state.schedule != before.schedule;
        let diversity_changed = state.diversity != before.diversity;
        if !schedule_changed && !diversity_changed {
            return Ok(value);
        }
        if schedule_changed {
            state.touch_schedule();
        }
        if diversity_changed {
            state.touch_diversity();
        }

        self.store.save_if_unchanged(&state, before.revision())?;
        Ok(value)
    }
}

impl std::fmt::Debug for PostingDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostingDesk")
            .field("store", &self.store.location())
            .field("patterns", &self.patterns.names())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
