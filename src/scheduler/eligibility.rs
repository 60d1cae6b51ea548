//! Eligibility evaluation and next-slot prediction
//!
//! Checks run in a fixed order and the first failing one decides:
//!
//! 1. minimum spacing (widened by backoff after failures)
//! 2. daily cap, counted from local midnight
//! 3. weekly cap, over the trailing 7 days
//! 4. preferred local hours
//! 5. randomized natural skip

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PostingRecord;
use crate::pattern::{HourWindow, PostingPattern};
use crate::utils::local_midnight;

use super::backoff::{BackoffPolicy, BackoffState};
use super::draw::UnitDraw;
use super::history::PostingHistory;

/// Upper bound on advancement steps when predicting the next slot
const MAX_ADVANCE_STEPS: usize = 64;

// ============================================================================
// Decisions
// ============================================================================

/// Why posting is not allowed right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// Minimum spacing since the last post has not elapsed
    TooSoon { eligible_at: DateTime<Utc> },

    /// Daily cap reached
    DailyLimit { limit: u32 },

    /// Trailing weekly cap reached
    WeeklyLimit { limit: u32 },

    /// Current local hour is outside the preferred window
    OutsideWindow { hour: u32, window: HourWindow },
}

impl BlockReason {
    /// Short stable label
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooSoon { .. } => "too soon",
            Self::DailyLimit { .. } => "daily limit",
            Self::WeeklyLimit { .. } => "weekly limit",
            Self::OutsideWindow { .. } => "outside window",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSoon { eligible_at } => {
                write!(f, "too soon; eligible after {}", eligible_at.to_rfc3339())
            }
            Self::DailyLimit { limit } => write!(f, "daily limit of {limit} reached"),
            Self::WeeklyLimit { limit } => write!(f, "weekly limit of {limit} reached"),
            Self::OutsideWindow { hour, window } => {
                write!(f, "outside window: hour {hour:02} not in {window}")
            }
        }
    }
}

/// Why an otherwise eligible opportunity was passed over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Randomized { draw: f64, probability: f64 },
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Randomized { .. } => "randomized",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Randomized { draw, probability } => {
                write!(f, "randomized skip (draw {draw:.3} < {probability:.2})")
            }
        }
    }
}

/// Result of an eligibility evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Eligible,
    Blocked(BlockReason),
    Skipped(SkipReason),
}

impl Decision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eligible => write!(f, "eligible"),
            Self::Blocked(reason) => write!(f, "blocked: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

// ============================================================================
// Posting Scheduler
// ============================================================================

/// Stateless evaluator; history and pattern are passed into every call
#[derive(Debug, Clone)]
pub struct PostingScheduler {
    tz: FixedOffset,
    allow_off_hours: bool,
    backoff: BackoffPolicy,
}

impl PostingScheduler {
    pub fn new(tz: FixedOffset) -> Self {
        Self {
            tz,
            allow_off_hours: false,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Permit posting outside the pattern's preferred hours
    pub fn with_off_hours(mut self, allow: bool) -> Self {
        self.allow_off_hours = allow;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    pub fn backoff_state(&self, history: &PostingHistory) -> BackoffState {
        self.backoff.assess(history)
    }

    /// Spacing after backoff
    pub fn effective_min_delay(&self, history: &PostingHistory, pattern: &PostingPattern) -> Duration {
        let state = self.backoff.assess(history);
        self.backoff.effective_min_delay(pattern, &state)
    }

    /// Earliest instant the spacing check passes, if any post constrains it
    ///
    /// Spacing runs from the last success; while backoff is active it runs
    /// from the last attempt of either kind.
    pub fn spacing_ready_at(&self, history: &PostingHistory, pattern: &PostingPattern) -> Option<DateTime<Utc>> {
        let state = self.backoff.assess(history);
        let last_success = history.last_succeeded().map(|r| r.timestamp);
        let anchor = if state.active {
            let last_attempt = history.last_attempt().map(|r| r.timestamp);
            last_success.max(last_attempt)
        } else {
            last_success
        }?;
        let delay = self.backoff.effective_min_delay(pattern, &state);
        Some(anchor.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Evaluate whether a post may go out at `now`
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        history: &PostingHistory,
        pattern: &PostingPattern,
        draw: &mut dyn UnitDraw,
    ) -> Decision {
        if let Some(reason) = self.first_block(now, history, pattern) {
            tracing::debug!(
                pattern = %pattern.name,
                reason = reason.code(),
                "Posting blocked"
            );
            return Decision::Blocked(reason);
        }

        let value = draw.next_unit();
        if value < pattern.random_skip_probability {
            tracing::info!(
                pattern = %pattern.name,
                draw = value,
                probability = pattern.random_skip_probability,
                "Natural skip triggered"
            );
            return Decision::Skipped(SkipReason::Randomized {
                draw: value,
                probability: pattern.random_skip_probability,
            });
        }

        Decision::Eligible
    }

    /// First deterministic check that fails at `now`, if any
    ///
    /// Spacing, then the daily cap, the weekly cap and preferred hours.
    pub fn first_block(
        &self,
        now: DateTime<Utc>,
        history: &PostingHistory,
        pattern: &PostingPattern,
    ) -> Option<BlockReason> {
        if let Some(eligible_at) = self.spacing_ready_at(history, pattern) {
            if now < eligible_at {
                return Some(BlockReason::TooSoon { eligible_at });
            }
        }

        if history.count_since_local_midnight(now, self.tz) >= pattern.daily_limit as usize {
            return Some(BlockReason::DailyLimit {
                limit: pattern.daily_limit,
            });
        }

        if history.count_in_trailing_days(now, 7) >= pattern.weekly_limit as usize {
            return Some(BlockReason::WeeklyLimit {
                limit: pattern.weekly_limit,
            });
        }

        let hour = now.with_timezone(&self.tz).hour();
        if !self.allow_off_hours && !pattern.preferred_hours.contains(hour) {
            return Some(BlockReason::OutsideWindow {
                hour,
                window: pattern.preferred_hours,
            });
        }

        None
    }

    /// Earliest instant at or after `now` at which checks 1-4 all pass
    ///
    /// The natural skip is drawn live and never predicted.
    pub fn next_suggested_time(
        &self,
        now: DateTime<Utc>,
        history: &PostingHistory,
        pattern: &PostingPattern,
    ) -> DateTime<Utc> {
        let mut t = now;
        if let Some(ready) = self.spacing_ready_at(history, pattern) {
            t = t.max(ready);
        }

        for _ in 0..MAX_ADVANCE_STEPS {
            if history.count_since_local_midnight(t, self.tz) >= pattern.daily_limit as usize {
                t = local_midnight(t, self.tz) + Duration::days(1);
                continue;
            }
            if let Some(release) = self.weekly_release(t, history, pattern) {
                t = release;
                continue;
            }
            if let Some(open) = self.window_opening(t, pattern) {
                t = open;
                continue;
            }
            return t;
        }

        tracing::warn!(pattern = %pattern.name, "Next slot search did not settle");
        t
    }

    /// When enough trailing successes age out for the weekly cap to pass
    fn weekly_release(
        &self,
        t: DateTime<Utc>,
        history: &PostingHistory,
        pattern: &PostingPattern,
    ) -> Option<DateTime<Utc>> {
        let week = Duration::days(7);
        let in_window: Vec<&PostingRecord> = history
            .records()
            .iter()
            .filter(|r| r.is_success() && r.timestamp > t - week && r.timestamp <= t)
            .collect();
        let limit = pattern.weekly_limit as usize;
        if in_window.len() < limit {
            return None;
        }
        // Records are chronological; once this one ages out the count is below the cap
        let pivot = in_window[in_window.len() - limit];
        Some(pivot.timestamp + week)
    }

    /// Start of the next preferred window if `t` is outside it
    fn window_opening(&self, t: DateTime<Utc>, pattern: &PostingPattern) -> Option<DateTime<Utc>> {
        let local = t.with_timezone(&self.tz);
        if self.allow_off_hours || pattern.preferred_hours.contains(local.hour()) {
            return None;
        }

        let start = NaiveTime::from_hms_opt(u32::from(pattern.preferred_hours.start), 0, 0)
            .unwrap_or(NaiveTime::MIN);
        let offset = Duration::seconds(i64::from(self.tz.local_minus_utc()));
        let mut opening = (local.date_naive().and_time(start) - offset).and_utc();
        if opening <= t {
            opening += Duration::days(1);
        }
        Some(opening)
    }
}

impl Default for PostingScheduler {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}
