//! Named posting patterns
//!
//! A pattern bundles the cadence parameters the scheduler evaluates against:
//! spacing bounds, daily and weekly caps, preferred local hours and the
//! natural skip probability. Three canonical patterns ship built in
//! (`conservative`, `moderate`, `active`); custom ones can be added from
//! configuration and are validated before use.
//!
//! | Pattern | Delay | Daily | Weekly | Hours | Skip |
//! |---------|-------|-------|--------|-------|------|
//! | conservative | 8-72h | 1 | 5 | 09-17 | 0.15 |
//! | moderate | 4-48h | 2 | 10 | 09-17 | 0.10 |
//! | active | 2-24h | 3 | 18 | 08-20 | 0.05 |

pub mod error;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use error::{PatternError, PatternResult};

/// Name of the pattern used when nothing else is configured
pub const DEFAULT_PATTERN: &str = "moderate";

/// Longest spacing a pattern may ask for: one year
pub const MAX_DELAY_HOURS: u32 = 24 * 365;

// ============================================================================
// Hour Window
// ============================================================================

/// Inclusive range of local hours; wraps past midnight when `start > end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
}

impl HourWindow {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Every hour of the day
    pub fn all_day() -> Self {
        Self { start: 0, end: 23 }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start <= end {
            hour >= start && hour <= end
        } else {
            hour >= start || hour <= end
        }
    }
}

impl fmt::Display for HourWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:59", self.start, self.end)
    }
}

// ============================================================================
// Posting Pattern
// ============================================================================

/// Cadence parameters for one named pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingPattern {
    pub name: String,

    /// Minimum hours between successful posts
    pub min_delay_hours: u32,

    /// Upper bound for spacing, including progressive backoff
    pub max_delay_hours: u32,

    /// Successful posts allowed per local calendar day
    pub daily_limit: u32,

    /// Successful posts allowed in any trailing 7 days
    pub weekly_limit: u32,

    /// Local hours in which posting is allowed
    pub preferred_hours: HourWindow,

    /// Chance of a natural skip on an otherwise eligible opportunity
    pub random_skip_probability: f64,
}

impl PostingPattern {
    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            min_delay_hours: 8,
            max_delay_hours: 72,
            daily_limit: 1,
            weekly_limit: 5,
            preferred_hours: HourWindow::new(9, 17),
            random_skip_probability: 0.15,
        }
    }

    pub fn moderate() -> Self {
        Self {
            name: "moderate".to_string(),
            min_delay_hours: 4,
            max_delay_hours: 48,
            daily_limit: 2,
            weekly_limit: 10,
            preferred_hours: HourWindow::new(9, 17),
            random_skip_probability: 0.10,
        }
    }

    pub fn active() -> Self {
        Self {
            name: "active".to_string(),
            min_delay_hours: 2,
            max_delay_hours: 24,
            daily_limit: 3,
            weekly_limit: 18,
            preferred_hours: HourWindow::new(8, 20),
            random_skip_probability: 0.05,
        }
    }

    /// All built-in patterns
    pub fn canonical() -> Vec<Self> {
        vec![Self::conservative(), Self::moderate(), Self::active()]
    }

    pub fn min_delay(&self) -> Duration {
        Duration::hours(i64::from(self.min_delay_hours))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::hours(i64::from(self.max_delay_hours))
    }

    /// Check the invariants every pattern must satisfy
    pub fn validate(&self) -> PatternResult<()> {
        if self.name.trim().is_empty() {
            return Err(PatternError::EmptyName);
        }

        let positives = [
            ("min_delay_hours", self.min_delay_hours),
            ("max_delay_hours", self.max_delay_hours),
            ("daily_limit", self.daily_limit),
            ("weekly_limit", self.weekly_limit),
        ];
        for (field, value) in positives {
            if value == 0 {
                return Err(PatternError::non_positive(&self.name, field));
            }
        }

        if self.min_delay_hours > self.max_delay_hours {
            return Err(PatternError::DelayRange {
                pattern: self.name.clone(),
                min: self.min_delay_hours,
                max: self.max_delay_hours,
            });
        }

        if self.max_delay_hours > MAX_DELAY_HOURS {
            return Err(PatternError::DelayTooLong {
                pattern: self.name.clone(),
                max: self.max_delay_hours,
                limit: MAX_DELAY_HOURS,
            });
        }

        let p = self.random_skip_probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(PatternError::InvalidProbability {
                pattern: self.name.clone(),
                value: p,
            });
        }

        for hour in [self.preferred_hours.start, self.preferred_hours.end] {
            if hour > 23 {
                return Err(PatternError::InvalidHour {
                    pattern: self.name.clone(),
                    hour,
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Pattern Set
// ============================================================================

/// Registry of validated patterns, keyed by lowercase name
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: BTreeMap<String, PostingPattern>,
    default_name: String,
}

impl PatternSet {
    /// Built-in patterns with `moderate` as default
    pub fn canonical() -> Self {
        let patterns = PostingPattern::canonical()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            patterns,
            default_name: DEFAULT_PATTERN.to_string(),
        }
    }

    /// Built-ins plus custom patterns; a custom pattern replaces a built-in
    /// of the same name. Nothing is registered unless everything validates.
    pub fn with_custom(custom: &[PostingPattern], default_name: &str) -> PatternResult<Self> {
        let mut set = Self::canonical();
        for pattern in custom {
            pattern.validate()?;
        }
        for pattern in custom {
            let mut pattern = pattern.clone();
            pattern.name = pattern.name.trim().to_lowercase();
            set.patterns.insert(pattern.name.clone(), pattern);
        }

        let default_key = default_name.trim().to_lowercase();
        if !set.patterns.contains_key(&default_key) {
            return Err(PatternError::unknown(default_name, set.names()));
        }
        set.default_name = default_key;
        Ok(set)
    }

    /// Look up a pattern by name, case-insensitively
    pub fn resolve(&self, name: &str) -> PatternResult<&PostingPattern> {
        self.patterns
            .get(&name.trim().to_lowercase())
            .ok_or_else(|| PatternError::unknown(name, self.names()))
    }

    pub fn default_pattern(&self) -> &PostingPattern {
        // default_name is checked on construction
        &self.patterns[&self.default_name]
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingPattern> {
        self.patterns.values()
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::canonical()
    }
}
