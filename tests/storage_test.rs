//! Integration tests for persisted state
//!
//! These tests verify:
//! - Byte-stable save/load cycles on the JSON backend
//! - Recovery from corrupt documents through the operator API
//! - The SQLite backend behind the same desk
//! - Advisory locking between overlapping invocations

mod common;

use chrono::Duration;
use pacer::desk::PostingDesk;
use pacer::error::{ErrorCategory, PacerErrorTrait};
use pacer::models::{AttemptOutcome, DiversityEntry, Fingerprint, PostingRecord};
use pacer::outcome::Outcome;
use pacer::storage::{JsonStateStore, StateStore, StorageBackend, StorageWarning};
use std::fs;
use tempfile::TempDir;

use common::{config_in, desk_in, garden_article, monday_at, tech_article};

fn populated_store(dir: &TempDir) -> JsonStateStore {
    let store = JsonStateStore::new(dir.path(), Duration::minutes(10));
    let mut state = store.load().unwrap().state;

    state.schedule.pattern = Some("conservative".to_string());
    for (hour, outcome) in [(9, AttemptOutcome::Succeeded), (11, AttemptOutcome::Skipped), (15, AttemptOutcome::Failed)] {
        let record = PostingRecord::new(monday_at(hour), outcome)
            .with_category("technology")
            .with_note(format!("attempt at {hour}:00"));
        state.schedule.records.push(record);
    }
    for article in [tech_article(), garden_article()] {
        let fingerprint = Fingerprint::of_text(&article.body);
        state
            .diversity
            .entries
            .push(DiversityEntry::from_candidate(&article, fingerprint, monday_at(9)), 50);
    }
    state.touch_schedule();
    state.touch_diversity();
    store.save(&state).unwrap();
    store
}

// ============================================================================
// JSON Backend
// ============================================================================

#[test]
fn test_save_of_load_is_byte_stable() {
    let dir = TempDir::new().unwrap();
    let store = populated_store(&dir);

    let schedule_before = fs::read(store.schedule_path()).unwrap();
    let diversity_before = fs::read(store.diversity_path()).unwrap();

    for _ in 0..3 {
        let loaded = store.load().unwrap();
        assert!(loaded.warnings.is_empty());
        store.save(&loaded.state).unwrap();
    }

    assert_eq!(fs::read(store.schedule_path()).unwrap(), schedule_before);
    assert_eq!(fs::read(store.diversity_path()).unwrap(), diversity_before);
}

#[test]
fn test_documents_are_readable_json() {
    let dir = TempDir::new().unwrap();
    let store = populated_store(&dir);

    let schedule: serde_json::Value =
        serde_json::from_slice(&fs::read(store.schedule_path()).unwrap()).unwrap();
    assert_eq!(schedule["version"], 1);
    assert_eq!(schedule["pattern"], "conservative");
    assert_eq!(schedule["records"].as_array().unwrap().len(), 3);

    let diversity: serde_json::Value =
        serde_json::from_slice(&fs::read(store.diversity_path()).unwrap()).unwrap();
    assert_eq!(diversity["entries"].as_array().unwrap().len(), 2);
}

#[test]
fn test_corrupt_schedule_reported_and_repaired() {
    let dir = TempDir::new().unwrap();
    let store = populated_store(&dir);
    fs::write(store.schedule_path(), "{\"version\": 1, \"records\": [").unwrap();

    let desk = desk_in(dir.path());
    let outcome = desk.history(10).unwrap();
    match &outcome {
        Outcome::StorageCorrupt { value, warnings } => {
            assert!(value.is_empty());
            assert_eq!(warnings.len(), 1);
            assert!(matches!(warnings[0], StorageWarning::Corrupt { .. }));
        }
        other => panic!("expected StorageCorrupt, got {other:?}"),
    }

    // The diversity document was intact and is untouched
    let report = desk.diversity_report().unwrap();
    assert_eq!(report.value().unwrap().total, 2);

    // Any write replaces the unreadable document
    desk.set_pattern("active").unwrap();
    let healed = store.load().unwrap();
    assert!(healed.degraded().is_empty());
    assert_eq!(healed.state.schedule.pattern.as_deref(), Some("active"));
}

#[test]
fn test_future_version_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let store = populated_store(&dir);
    fs::write(
        store.diversity_path(),
        "{\"version\": 7, \"revision\": 3, \"entries\": []}\n",
    )
    .unwrap();

    let outcome = desk_in(dir.path()).diversity_report().unwrap();
    assert!(matches!(
        outcome,
        Outcome::StorageCorrupt { ref warnings, .. }
            if matches!(warnings[0], StorageWarning::UnsupportedVersion { found: 7, .. })
    ));
}

// ============================================================================
// SQLite Backend
// ============================================================================

#[test]
fn test_sqlite_backend_through_desk() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.storage.backend = StorageBackend::Sqlite;

    {
        let desk = PostingDesk::from_config(&config).unwrap();
        let outcome = desk.set_pattern("conservative").unwrap();
        assert!(outcome.is_ok());
    }

    assert!(dir.path().join("pacer.db").exists());

    let desk = PostingDesk::from_config(&config).unwrap();
    let status = desk.status(monday_at(10)).unwrap();
    assert_eq!(status.value().unwrap().pattern.name, "conservative");
}

// ============================================================================
// Locking
// ============================================================================

#[test]
fn test_held_lock_blocks_mutations_but_not_reads() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());

    let _held = desk.store().lock().unwrap();

    let err = desk.set_pattern("active").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Concurrency);
    assert!(err.is_recoverable());

    assert!(desk.status(monday_at(10)).unwrap().is_ok());
}

#[test]
fn test_lock_released_after_mutation() {
    let dir = TempDir::new().unwrap();
    let desk = desk_in(dir.path());

    desk.set_pattern("active").unwrap();
    desk.set_pattern("moderate").unwrap();

    assert!(!dir.path().join(".pacer.lock").exists());
}
