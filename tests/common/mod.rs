//! Common test utilities

use chrono::{DateTime, Duration, TimeZone, Utc};
use pacer::config::Config;
use pacer::desk::PostingDesk;
use pacer::models::{AttemptOutcome, ContentCandidate, PostingRecord};
use pacer::storage::StateStore;
use std::path::Path;

/// 2024-03-04 (a Monday) at the given UTC hour
pub fn monday_at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap()
}

/// `base` shifted by whole hours
#[allow(dead_code)]
pub fn hours_after(base: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    base + Duration::hours(hours)
}

/// Default configuration with state kept in `dir`
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    config
}

/// Desk over JSON state in `dir`
#[allow(dead_code)]
pub fn desk_in(dir: &Path) -> PostingDesk {
    PostingDesk::from_config(&config_in(dir)).unwrap()
}

/// Desk with default settings over any store
#[allow(dead_code)]
pub fn desk_with_store(dir: &Path, store: Box<dyn StateStore>) -> PostingDesk {
    let config = config_in(dir);
    PostingDesk::new(
        store,
        config.pattern_set().unwrap(),
        config.scheduler(),
        config.tracker(),
        config.quality_gate().unwrap(),
    )
}

#[allow(dead_code)]
pub fn succeeded_at(timestamp: DateTime<Utc>) -> PostingRecord {
    PostingRecord::new(timestamp, AttemptOutcome::Succeeded).with_category("technology")
}

/// Clean technology article that passes the default gates
#[allow(dead_code)]
pub fn tech_article() -> ContentCandidate {
    ContentCandidate::new(
        "Structuring Async Services in Rust",
        "Writing asynchronous services in Rust rewards careful thinking about ownership. \
         This guide walks through structuring tasks, sharing state between workers, \
         handling cancellation cleanly, and measuring latency under load. Each section \
         includes small programs you can adapt for your own backend projects, along with \
         notes on testing them reliably.",
    )
    .with_category("technology")
    .with_style("tutorial")
    .with_angle("expert tips")
}

/// Clean lifestyle article sharing nothing with [`tech_article`]
#[allow(dead_code)]
pub fn garden_article() -> ContentCandidate {
    ContentCandidate::new(
        "Growing Tomatoes on a Small Balcony",
        "Growing tomatoes on a small balcony takes less space than most people expect. \
         Choose compact varieties, water deeply twice a week, and feed the plants with \
         compost every month. Morning sunlight matters more than afternoon heat, so place \
         containers facing east whenever possible. Harvest fruit when it turns fully red \
         and slightly soft.",
    )
    .with_category("lifestyle")
    .with_style("listicle")
    .with_angle("beginner guide")
}
