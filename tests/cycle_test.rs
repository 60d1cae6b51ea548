//! Integration tests for the generate/publish cycle
//!
//! These tests drive `PostingDesk::run_cycle` with in-process collaborators
//! and check what ends up in persisted state.

mod common;

use async_trait::async_trait;
use chrono::TimeZone;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use pacer::desk::{
    CollaboratorError, ContentSource, CycleOutcome, CycleSettings, GenerationHint, PostingDesk,
    PublishReceipt, PublishTarget,
};
use pacer::error::{Error, ErrorCategory, PacerErrorTrait};
use pacer::models::{AttemptOutcome, ContentCandidate};
use pacer::outcome::Outcome;
use pacer::scheduler::{BlockReason, FixedDraw};
use pacer::storage::{
    JsonStateStore, Loaded, PersistedState, StateRevision, StateStore, StorageError, StoreLock,
};

use common::{
    desk_in, desk_with_store, garden_article, hours_after, monday_at, succeeded_at, tech_article,
};

/// Hands out queued candidates, repeating the last one when the queue runs dry
struct ScriptedSource {
    queue: Mutex<VecDeque<ContentCandidate>>,
    hints: Mutex<Vec<GenerationHint>>,
}

impl ScriptedSource {
    fn new(candidates: Vec<ContentCandidate>) -> Self {
        Self {
            queue: Mutex::new(candidates.into()),
            hints: Mutex::new(Vec::new()),
        }
    }

    fn hints(&self) -> Vec<GenerationHint> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn generate(&self, hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError> {
        self.hints.lock().unwrap().push(hint.clone());
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| CollaboratorError::Rejected("nothing to write".to_string()))
        }
    }
}

struct BrokenSource;

#[async_trait]
impl ContentSource for BrokenSource {
    async fn generate(&self, _hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError> {
        Err(CollaboratorError::Command {
            role: "generator",
            detail: "model unavailable".to_string(),
        })
    }
}

struct SlowSource;

#[async_trait]
impl ContentSource for SlowSource {
    async fn generate(&self, _hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(tech_article())
    }
}

/// Runs a whole cycle on a rival desk before answering
struct HijackingSource {
    rival: PostingDesk,
    rival_target: RecordingTarget,
}

#[async_trait]
impl ContentSource for HijackingSource {
    async fn generate(&self, _hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let rival_source = ScriptedSource::new(vec![garden_article()]);
        let outcome = self
            .rival
            .run_cycle(
                monday_at(10),
                &rival_source,
                &self.rival_target,
                &settings(),
                &mut FixedDraw::never_skip(),
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome.value().unwrap().outcome,
            CycleOutcome::Published { .. }
        ));
        Ok(tech_article())
    }
}

/// JSON store where another writer records a success just before our first write
struct RacingStore {
    inner: JsonStateStore,
    raced: AtomicBool,
}

impl StateStore for RacingStore {
    fn load(&self) -> Result<Loaded, StorageError> {
        self.inner.load()
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        self.inner.save(state)
    }

    fn save_if_unchanged(
        &self,
        state: &PersistedState,
        expected: StateRevision,
    ) -> Result<(), StorageError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut theirs = self.inner.load()?.state;
            theirs.schedule.records.push(succeeded_at(monday_at(10)));
            theirs.touch_schedule();
            self.inner.save(&theirs)?;
        }
        self.inner.save_if_unchanged(state, expected)
    }

    fn lock(&self) -> Result<StoreLock, StorageError> {
        self.inner.lock()
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

/// Accepts everything and remembers it
#[derive(Default)]
struct RecordingTarget {
    published: Mutex<Vec<ContentCandidate>>,
    refuse: bool,
}

impl RecordingTarget {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    fn published(&self) -> Vec<ContentCandidate> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishTarget for RecordingTarget {
    async fn publish(&self, post: &ContentCandidate) -> Result<PublishReceipt, CollaboratorError> {
        if self.refuse {
            return Err(CollaboratorError::Rejected("account suspended".to_string()));
        }
        let mut published = self.published.lock().unwrap();
        published.push(post.clone());
        Ok(PublishReceipt {
            id: Some(format!("post-{}", published.len())),
            url: None,
        })
    }
}

fn settings() -> CycleSettings {
    CycleSettings {
        max_attempts: 3,
        generate_timeout_secs: 1,
        publish_timeout_secs: 1,
    }
}

// ============================================================================
// Published
// ============================================================================

#[tokio::test]
async fn test_eligible_cycle_publishes_and_records() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let source = ScriptedSource::new(vec![tech_article()]);
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(report.pattern, "moderate");
    assert!(matches!(
        &report.outcome,
        CycleOutcome::Published { receipt, .. } if receipt.id.as_deref() == Some("post-1")
    ));
    assert_eq!(report.record.outcome, AttemptOutcome::Succeeded);
    assert_eq!(report.record.pattern.as_deref(), Some("moderate"));
    assert_eq!(target.published().len(), 1);

    let state = desk.store().load().unwrap().state;
    assert_eq!(state.schedule.records.len(), 1);
    assert_eq!(state.diversity.entries.len(), 1);
    assert_eq!(state.diversity.entries.entries()[0].category, "technology");
    assert_eq!(
        state.schedule.records.records()[0].fingerprint,
        Some(state.diversity.entries.entries()[0].fingerprint.clone())
    );
}

#[tokio::test]
async fn test_published_post_is_normalized() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let mut article = tech_article();
    article.title = "Structuring Async Services in Rust - click here".to_string();
    let source = ScriptedSource::new(vec![article]);
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    assert!(outcome.is_ok());
    let published = target.published();
    assert!(!published[0].title.to_lowercase().contains("click here"));
    assert!(!published[0].keywords.is_empty());
}

#[tokio::test]
async fn test_second_post_waits_for_spacing() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let source = ScriptedSource::new(vec![tech_article(), garden_article()]);
    let target = RecordingTarget::default();

    desk.run_cycle(monday_at(9), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let early = desk
        .run_cycle(monday_at(11), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();
    assert!(matches!(
        early,
        Outcome::Blocked {
            reason: BlockReason::TooSoon { .. }
        }
    ));

    let later = desk
        .run_cycle(hours_after(monday_at(9), 4), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();
    assert!(matches!(
        later.value().unwrap().outcome,
        CycleOutcome::Published { .. }
    ));

    let titles: Vec<String> = target.published().into_iter().map(|p| p.title).collect();
    assert_eq!(
        titles,
        vec![tech_article().title, garden_article().title]
    );

    // Daily cap of two is now reached
    let status = desk.status(monday_at(17)).unwrap();
    assert!(matches!(
        status.value().unwrap().decision,
        pacer::scheduler::Decision::Blocked(BlockReason::DailyLimit { limit: 2 })
    ));
}

// ============================================================================
// Blocked, skipped, rejected, failed
// ============================================================================

#[tokio::test]
async fn test_blocked_cycle_records_nothing() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let source = ScriptedSource::new(vec![tech_article()]);
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(22), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        Outcome::Blocked {
            reason: BlockReason::OutsideWindow { hour: 22, .. }
        }
    ));
    assert!(source.hints().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_natural_skip_is_recorded() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let source = ScriptedSource::new(vec![tech_article()]);
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw(0.0))
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert!(matches!(report.outcome, CycleOutcome::Skipped { .. }));
    assert_eq!(report.attempts, 0);
    assert!(source.hints().is_empty());

    let history = desk.history(10).unwrap();
    let history = history.value().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, AttemptOutcome::Skipped);
    assert!(history[0].note.as_deref().unwrap().contains("randomized"));
}

#[tokio::test]
async fn test_repeated_content_rejected_then_recorded_failed() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    desk.run_cycle(
        monday_at(9),
        &ScriptedSource::new(vec![tech_article()]),
        &target,
        &settings(),
        &mut FixedDraw::never_skip(),
    )
    .await
    .unwrap();

    // The generator insists on the same article
    let stubborn = ScriptedSource::new(vec![tech_article()]);
    let outcome = desk
        .run_cycle(monday_at(14), &stubborn, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    match &report.outcome {
        CycleOutcome::Rejected { attempts, reasons } => {
            assert_eq!(*attempts, 3);
            assert_eq!(reasons.len(), 3);
            assert!(reasons.iter().all(|r| r.contains("duplicate")));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(report.record.outcome, AttemptOutcome::Failed);
    assert_eq!(target.published().len(), 1);

    // Feedback flows back into later attempts
    let hints = stubborn.hints();
    assert_eq!(hints.len(), 3);
    assert!(hints[0].feedback.is_empty());
    assert_eq!(hints[2].feedback.len(), 2);
    assert_eq!(hints[2].attempt, 3);

    let state = desk.store().load().unwrap().state;
    assert_eq!(state.schedule.records.len(), 2);
    assert_eq!(state.diversity.entries.len(), 1);
}

#[tokio::test]
async fn test_near_duplicate_keywords_rejected() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    let first = tech_article().with_keywords(["rust", "async", "services"]);
    desk.run_cycle(
        monday_at(9),
        &ScriptedSource::new(vec![first]),
        &target,
        &settings(),
        &mut FixedDraw::never_skip(),
    )
    .await
    .unwrap();

    // Different text, same keywords
    let echo = garden_article()
        .with_category("technology")
        .with_keywords(["Rust", "async", "services"]);
    let source = ScriptedSource::new(vec![echo, garden_article()]);
    let outcome = desk
        .run_cycle(monday_at(14), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert_eq!(report.attempts, 2);
    assert!(matches!(report.outcome, CycleOutcome::Published { .. }));
    let hints = source.hints();
    assert!(hints[1].feedback[0].starts_with("diversity:"));
}

#[tokio::test]
async fn test_generator_error_recorded_as_failure() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(10), &BrokenSource, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert!(matches!(
        &report.outcome,
        CycleOutcome::Failed { stage, .. } if stage == "generate"
    ));
    assert_eq!(report.record.outcome, AttemptOutcome::Failed);
    assert!(report.record.note.as_deref().unwrap().contains("model unavailable"));
    assert!(target.published().is_empty());
}

#[tokio::test]
async fn test_generator_timeout_recorded_as_failure() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle(monday_at(10), &SlowSource, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert!(matches!(report.outcome, CycleOutcome::Failed { .. }));
    assert!(report.record.note.as_deref().unwrap().contains("timed out"));
    assert_eq!(desk.history(5).unwrap().value().unwrap().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_keeps_window_clean() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let source = ScriptedSource::new(vec![tech_article()]);
    let target = RecordingTarget::refusing();

    let outcome = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert!(matches!(
        &report.outcome,
        CycleOutcome::Failed { stage, .. } if stage == "publish"
    ));
    assert!(report.record.fingerprint.is_some());

    let state = desk.store().load().unwrap().state;
    assert_eq!(state.schedule.records.len(), 1);
    assert!(state.diversity.entries.is_empty());
}

#[tokio::test]
async fn test_failure_stretches_spacing() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    desk.run_cycle(monday_at(9), &BrokenSource, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    // Normal spacing would allow 13:00; one failure doubles it from the attempt
    let retry = desk
        .run_cycle(monday_at(14), &BrokenSource, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();
    assert!(matches!(
        retry,
        Outcome::Blocked {
            reason: BlockReason::TooSoon { eligible_at }
        } if eligible_at == monday_at(17)
    ));

    let status = desk.status(monday_at(14)).unwrap();
    let status = status.value().unwrap();
    assert!(status.backoff.active);
    assert_eq!(status.backoff.multiplier, 2.0);
    assert_eq!(status.stats.failed, 1);
}

#[tokio::test]
async fn test_body_published_before_the_window_is_rejected() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let article = tech_article();
    let fingerprint = desk
        .gate()
        .evaluate(&article.title, &article.body, [])
        .fingerprint;

    let mut state = desk.store().load().unwrap().state;
    let long_ago = chrono::Utc.with_ymd_and_hms(2023, 11, 6, 10, 0, 0).unwrap();
    state
        .schedule
        .records
        .push(succeeded_at(long_ago).with_fingerprint(fingerprint));
    state.touch_schedule();
    desk.store().save(&state).unwrap();

    let source = ScriptedSource::new(vec![tech_article(), garden_article()]);
    let target = RecordingTarget::default();
    let outcome = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert_eq!(report.attempts, 2);
    assert!(source.hints()[1].feedback[0].contains("duplicate"));
    let titles: Vec<String> = target.published().into_iter().map(|p| p.title).collect();
    assert_eq!(titles, vec![garden_article().title]);
}

// ============================================================================
// Contention and cancellation
// ============================================================================

#[tokio::test]
async fn test_cycle_waits_out_a_held_lock_once_then_fails() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let _held = desk.store().lock().unwrap();
    let source = ScriptedSource::new(vec![tech_article()]);
    let target = RecordingTarget::default();

    let err = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::LockHeld { .. })));
    assert_eq!(err.category(), ErrorCategory::Concurrency);
    assert!(source.hints().is_empty());
    assert!(desk.store().load().unwrap().state.schedule.records.is_empty());
}

#[tokio::test]
async fn test_lock_taken_over_mid_cycle_stops_before_publishing() {
    let dir = TempDir::new().unwrap();
    let twitchy = |dir: &TempDir| {
        desk_with_store(
            dir.path(),
            Box::new(JsonStateStore::new(dir.path(), chrono::Duration::milliseconds(1))),
        )
    };
    let desk = twitchy(&dir);
    desk.set_pattern("conservative").unwrap();

    let source = HijackingSource {
        rival: twitchy(&dir),
        rival_target: RecordingTarget::default(),
    };
    let target = RecordingTarget::default();

    let err = desk
        .run_cycle(monday_at(10), &source, &target, &settings(), &mut FixedDraw::never_skip())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::LockLost { .. })));
    assert_eq!(err.category(), ErrorCategory::Concurrency);
    assert!(target.published().is_empty());
    assert_eq!(source.rival_target.published().len(), 1);

    let history = desk.store().load().unwrap().state.schedule.records;
    assert_eq!(history.len(), 1);
    assert_eq!(history.count_outcome(AttemptOutcome::Succeeded), 1);
}

#[tokio::test]
async fn test_conflicting_success_is_not_replayed() {
    let dir = TempDir::new().unwrap();
    let store = RacingStore {
        inner: JsonStateStore::new(dir.path(), chrono::Duration::minutes(10)),
        raced: AtomicBool::new(false),
    };
    let desk = desk_with_store(dir.path(), Box::new(store));
    let target = RecordingTarget::default();

    let err = desk
        .run_cycle(
            monday_at(10),
            &ScriptedSource::new(vec![tech_article()]),
            &target,
            &settings(),
            &mut FixedDraw::never_skip(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::Superseded { .. })));
    assert_eq!(err.category(), ErrorCategory::Concurrency);

    // Only the other writer's success is on record
    let state = desk.store().load().unwrap().state;
    assert_eq!(state.schedule.records.len(), 1);
    assert!(state.schedule.records.records()[0].title.is_none());
    assert!(state.diversity.entries.is_empty());
}

#[tokio::test]
async fn test_cancelled_cycle_records_failure_and_releases_lock() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());
    let target = RecordingTarget::default();

    let outcome = desk
        .run_cycle_until(
            monday_at(10),
            &SlowSource,
            &target,
            &settings(),
            &mut FixedDraw::never_skip(),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();

    let report = outcome.value().unwrap();
    assert!(matches!(
        &report.outcome,
        CycleOutcome::Failed { stage, .. } if stage == "generate"
    ));
    assert_eq!(report.record.outcome, AttemptOutcome::Failed);
    assert!(report.record.note.as_deref().unwrap().contains("cancelled"));
    assert_eq!(desk.history(5).unwrap().value().unwrap().len(), 1);
    assert!(!dir.path().join(".pacer.lock").exists());
}
