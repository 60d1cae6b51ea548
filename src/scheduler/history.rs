//! Append-only posting history and its derived counters
//!
//! The record list is the only source of truth; every counter below is
//! recomputed from it on demand.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AttemptOutcome, Fingerprint, PostingRecord};
use crate::utils::local_midnight;

/// Chronologically ordered posting records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingHistory {
    records: Vec<PostingRecord>,
}

impl PostingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary records, restoring chronological order
    pub fn from_records(mut records: Vec<PostingRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self { records }
    }

    /// Append a record, keeping the list ordered if the clock stepped back
    pub fn push(&mut self, record: PostingRecord) {
        let at = self
            .records
            .partition_point(|r| r.timestamp <= record.timestamp);
        self.records.insert(at, record);
    }

    pub fn records(&self) -> &[PostingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record (explicit reset only)
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The newest `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> &[PostingRecord] {
        let start = self.records.len().saturating_sub(limit);
        &self.records[start..]
    }

    pub fn last_succeeded(&self) -> Option<&PostingRecord> {
        self.records.iter().rev().find(|r| r.is_success())
    }

    /// Fingerprints of every Succeeded record, however old
    pub fn published_fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.records
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|r| r.fingerprint.as_ref())
    }

    /// Most recent Succeeded or Failed record
    pub fn last_attempt(&self) -> Option<&PostingRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.outcome.is_terminal_attempt())
    }

    /// Up to `n` most recent Succeeded/Failed records, newest first
    pub fn trailing_attempts(&self, n: usize) -> impl Iterator<Item = &PostingRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.outcome.is_terminal_attempt())
            .take(n)
    }

    fn succeeded_between(&self, from_exclusive: DateTime<Utc>, to_inclusive: DateTime<Utc>) -> usize {
        self.records
            .iter()
            .filter(|r| r.is_success() && r.timestamp > from_exclusive && r.timestamp <= to_inclusive)
            .count()
    }

    /// Succeeded records in the trailing `hours`
    pub fn count_in_last_n_hours(&self, now: DateTime<Utc>, hours: i64) -> usize {
        self.succeeded_between(now - Duration::hours(hours), now)
    }

    /// Succeeded records in the trailing `days`
    pub fn count_in_trailing_days(&self, now: DateTime<Utc>, days: i64) -> usize {
        self.succeeded_between(now - Duration::days(days), now)
    }

    /// Succeeded records since local midnight of `now`
    pub fn count_since_local_midnight(&self, now: DateTime<Utc>, tz: FixedOffset) -> usize {
        let midnight = local_midnight(now, tz);
        self.records
            .iter()
            .filter(|r| r.is_success() && r.timestamp >= midnight && r.timestamp <= now)
            .count()
    }

    /// Succeeded records since the local Monday 00:00 of the current week
    pub fn count_in_current_calendar_week(&self, now: DateTime<Utc>, tz: FixedOffset) -> usize {
        let days_into_week = now.with_timezone(&tz).weekday().num_days_from_monday();
        let week_start = local_midnight(now, tz) - Duration::days(i64::from(days_into_week));
        self.records
            .iter()
            .filter(|r| r.is_success() && r.timestamp >= week_start && r.timestamp <= now)
            .count()
    }

    pub fn count_outcome(&self, outcome: AttemptOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Share of Succeeded among Succeeded/Failed records; `None` before any attempt
    pub fn success_rate(&self) -> Option<f64> {
        let attempts = self
            .records
            .iter()
            .filter(|r| r.outcome.is_terminal_attempt())
            .count();
        if attempts == 0 {
            return None;
        }
        Some(self.count_outcome(AttemptOutcome::Succeeded) as f64 / attempts as f64)
    }

    /// Snapshot of the usual counters
    pub fn stats(&self, now: DateTime<Utc>, tz: FixedOffset) -> PostingStats {
        PostingStats {
            total_records: self.len(),
            succeeded: self.count_outcome(AttemptOutcome::Succeeded),
            failed: self.count_outcome(AttemptOutcome::Failed),
            skipped: self.count_outcome(AttemptOutcome::Skipped),
            today: self.count_since_local_midnight(now, tz),
            last_24h: self.count_in_last_n_hours(now, 24),
            last_7d: self.count_in_trailing_days(now, 7),
            this_week: self.count_in_current_calendar_week(now, tz),
            success_rate: self.success_rate(),
        }
    }
}

/// Posting counters derived from the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostingStats {
    pub total_records: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub today: usize,
    pub last_24h: usize,
    pub last_7d: usize,
    pub this_week: usize,
    pub success_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        // 2024-01-01 is a Monday
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn record(ts: DateTime<Utc>, outcome: AttemptOutcome) -> PostingRecord {
        PostingRecord::new(ts, outcome)
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_push_keeps_order() {
        let mut history = PostingHistory::new();
        history.push(record(at(2, 10), AttemptOutcome::Succeeded));
        history.push(record(at(1, 10), AttemptOutcome::Failed));
        history.push(record(at(3, 10), AttemptOutcome::Skipped));

        let stamps: Vec<_> = history.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![at(1, 10), at(2, 10), at(3, 10)]);
    }

    #[test]
    fn test_last_succeeded_and_attempt() {
        let mut history = PostingHistory::new();
        history.push(record(at(1, 10), AttemptOutcome::Succeeded));
        history.push(record(at(1, 12), AttemptOutcome::Failed));
        history.push(record(at(1, 14), AttemptOutcome::Skipped));

        assert_eq!(history.last_succeeded().unwrap().timestamp, at(1, 10));
        assert_eq!(history.last_attempt().unwrap().timestamp, at(1, 12));
    }

    #[test]
    fn test_published_fingerprints_skip_failures() {
        let mut history = PostingHistory::new();
        history.push(record(at(1, 10), AttemptOutcome::Succeeded).with_fingerprint(Fingerprint::of_text("a")));
        history.push(record(at(1, 12), AttemptOutcome::Failed).with_fingerprint(Fingerprint::of_text("b")));
        history.push(record(at(1, 14), AttemptOutcome::Succeeded));

        let published: Vec<_> = history.published_fingerprints().cloned().collect();
        assert_eq!(published, vec![Fingerprint::of_text("a")]);
    }

    #[test]
    fn test_daily_count_ignores_failures_and_skips() {
        let mut history = PostingHistory::new();
        history.push(record(at(1, 23), AttemptOutcome::Succeeded));
        history.push(record(at(2, 9), AttemptOutcome::Succeeded));
        history.push(record(at(2, 10), AttemptOutcome::Failed));
        history.push(record(at(2, 11), AttemptOutcome::Skipped));

        assert_eq!(history.count_since_local_midnight(at(2, 12), utc()), 1);
        assert_eq!(history.count_in_last_n_hours(at(2, 12), 24), 2);
    }

    #[test]
    fn test_calendar_week_vs_trailing_week() {
        let mut history = PostingHistory::new();
        // Sunday of the previous ISO week, then Monday and Wednesday
        history.push(record(Utc.with_ymd_and_hms(2023, 12, 31, 10, 0, 0).unwrap(), AttemptOutcome::Succeeded));
        history.push(record(at(1, 10), AttemptOutcome::Succeeded));
        history.push(record(at(3, 10), AttemptOutcome::Succeeded));

        let now = at(4, 12);
        assert_eq!(history.count_in_current_calendar_week(now, utc()), 2);
        assert_eq!(history.count_in_trailing_days(now, 7), 3);
    }

    #[test]
    fn test_success_rate_excludes_skips() {
        let mut history = PostingHistory::new();
        assert!(history.success_rate().is_none());

        history.push(record(at(1, 10), AttemptOutcome::Succeeded));
        history.push(record(at(1, 11), AttemptOutcome::Failed));
        history.push(record(at(1, 12), AttemptOutcome::Skipped));
        assert!((history.success_rate().unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recent_and_trailing_attempts() {
        let mut history = PostingHistory::new();
        for hour in 0..6 {
            let outcome = if hour % 2 == 0 {
                AttemptOutcome::Failed
            } else {
                AttemptOutcome::Skipped
            };
            history.push(record(at(1, hour), outcome));
        }
        assert_eq!(history.recent(2).len(), 2);
        assert_eq!(history.recent(2)[1].timestamp, at(1, 5));
        assert_eq!(history.trailing_attempts(10).count(), 3);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut history = PostingHistory::new();
        history.push(record(at(1, 10), AttemptOutcome::Succeeded));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
    }
}
