//! Common utilities and helper functions
//!
//! Text helpers shared by the quality gate, the diversity tracker and the
//! fingerprinting code.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static INLINE_SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Collapse every whitespace run (including newlines) to a single space
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").to_string()
}

/// Collapse spaces and tabs inside each line and trim the line ends
///
/// Newlines are kept so paragraph structure survives normalization.
///
/// # Examples
///
/// ```
/// use pacer::utils::tidy_lines;
///
/// assert_eq!(tidy_lines("  a   b \n\tc  "), "a b\nc");
/// ```
pub fn tidy_lines(text: &str) -> String {
    text.lines()
        .map(|line| INLINE_SPACE_REGEX.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Remove HTML tags, leaving their text content
pub fn strip_tags(text: &str) -> String {
    TAG_REGEX.replace_all(text, " ").to_string()
}

/// Canonical form used for fingerprints: no markup, lowercase, single spaces
pub fn canonical_text(text: &str) -> String {
    normalize_whitespace(&strip_tags(text).to_lowercase())
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Start of the local calendar day containing `now`, as a UTC instant
pub fn local_midnight(now: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
    let local_midnight = now.with_timezone(&tz).date_naive().and_time(NaiveTime::MIN);
    (local_midnight - Duration::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}
