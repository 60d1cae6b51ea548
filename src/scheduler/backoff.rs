//! Progressive delay driven by recent failures
//!
//! When the trailing failure rate exceeds the threshold, the pattern's
//! minimum delay is multiplied by `factor^k` (k = trailing consecutive
//! failures, at least 1) and capped at the pattern's maximum delay.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::AttemptOutcome;
use crate::pattern::PostingPattern;

use super::history::PostingHistory;

/// Backoff curve parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Number of trailing attempts inspected
    pub window: usize,

    /// Failure rate above which backoff engages (0.0-1.0)
    pub failure_threshold: f64,

    /// Multiplier applied per consecutive failure
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            window: 5,
            failure_threshold: 0.5,
            factor: 2.0,
        }
    }
}

/// Backoff assessment for a given history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackoffState {
    pub failure_rate: f64,
    pub consecutive_failures: u32,
    pub multiplier: f64,
    pub active: bool,
}

impl BackoffState {
    fn idle(failure_rate: f64, consecutive_failures: u32) -> Self {
        Self {
            failure_rate,
            consecutive_failures,
            multiplier: 1.0,
            active: false,
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.window == 0 {
            return Err("backoff.window must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err("backoff.failure_threshold must be within 0.0-1.0".to_string());
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err("backoff.factor must be at least 1.0".to_string());
        }
        Ok(())
    }

    /// Inspect the trailing attempts of a history
    pub fn assess(&self, history: &PostingHistory) -> BackoffState {
        let trailing: Vec<_> = history.trailing_attempts(self.window).collect();
        if trailing.is_empty() {
            return BackoffState::idle(0.0, 0);
        }

        let failures = trailing
            .iter()
            .filter(|r| r.outcome == AttemptOutcome::Failed)
            .count();
        let failure_rate = failures as f64 / trailing.len() as f64;
        let consecutive = trailing
            .iter()
            .take_while(|r| r.outcome == AttemptOutcome::Failed)
            .count() as u32;

        if failure_rate <= self.failure_threshold {
            return BackoffState::idle(failure_rate, consecutive);
        }

        let exponent = consecutive.max(1) as i32;
        BackoffState {
            failure_rate,
            consecutive_failures: consecutive,
            multiplier: self.factor.powi(exponent),
            active: true,
        }
    }

    /// Minimum spacing after applying backoff, never above `max_delay_hours`
    /// and never below `min_delay_hours`
    pub fn effective_min_delay(&self, pattern: &PostingPattern, state: &BackoffState) -> Duration {
        if !state.active {
            return pattern.min_delay();
        }
        let min_secs = pattern.min_delay().num_seconds() as f64;
        let max_secs = pattern.max_delay().num_seconds() as f64;
        let widened = (min_secs * state.multiplier).min(max_secs).max(min_secs);
        Duration::seconds(widened.round() as i64)
    }
}
