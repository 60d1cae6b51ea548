//! Configuration management for pacer
//!
//! This module handles loading and validating configuration from a TOML
//! file, `PACER_*` environment variables and command-line overrides. Every
//! section has defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::desk::CycleSettings;
use crate::diversity::{DiversitySettings, DiversityTracker};
use crate::pattern::{PatternSet, PostingPattern, DEFAULT_PATTERN};
use crate::quality::{QualityGate, QualitySettings};
use crate::scheduler::{BackoffPolicy, PostingScheduler};
use crate::storage::{StorageBackend, StorageSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where state is persisted
    pub storage: StorageSettings,

    /// Eligibility checks
    pub scheduler: SchedulerConfig,

    /// Posting patterns
    pub patterns: PatternsConfig,

    /// Diversity scoring
    pub diversity: DiversitySettings,

    /// Spam and quality gate
    pub quality: QualitySettings,

    /// Generate-and-publish cycle
    pub cycle: CycleSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Local time offset from UTC used for days, weeks and preferred hours
    pub utc_offset_minutes: i32,

    /// Ignore preferred hours
    pub allow_off_hours: bool,

    /// Progressive delay after failures
    pub backoff: BackoffPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            allow_off_hours: false,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Pattern configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Pattern used until one is chosen explicitly
    pub default: String,

    /// Extra patterns; a custom pattern replaces a built-in of the same name
    pub custom: Vec<PostingPattern>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_PATTERN.to_string(),
            custom: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Defaults overlaid with `PACER_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File (when given), then environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `PACER_*` variables from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from any lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("PACER_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(backend) = lookup("PACER_STORAGE_BACKEND") {
            self.storage.backend = backend
                .parse::<StorageBackend>()
                .map_err(anyhow::Error::msg)
                .context("Invalid PACER_STORAGE_BACKEND")?;
        }

        if let Some(pattern) = lookup("PACER_PATTERN") {
            self.patterns.default = pattern;
        }

        if let Some(offset) = lookup("PACER_UTC_OFFSET_MINUTES") {
            self.scheduler.utc_offset_minutes = offset
                .trim()
                .parse::<i32>()
                .with_context(|| format!("Invalid PACER_UTC_OFFSET_MINUTES: {offset}"))?;
        }

        if let Some(allow) = lookup("PACER_ALLOW_OFF_HOURS") {
            self.scheduler.allow_off_hours = parse_flag(&allow)
                .with_context(|| format!("Invalid PACER_ALLOW_OFF_HOURS: {allow}"))?;
        }

        if let Some(level) = lookup("PACER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("PACER_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("scheduler.utc_offset_minutes must be within +/-1439");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        self.storage.validate().map_err(anyhow::Error::msg)?;
        self.scheduler.backoff.validate().map_err(anyhow::Error::msg)?;
        self.diversity.validate().map_err(anyhow::Error::msg)?;
        self.quality.validate().map_err(anyhow::Error::msg)?;
        self.cycle.validate().map_err(anyhow::Error::msg)?;

        // A live cycle must never look abandoned
        let longest_cycle = self.cycle.longest_cycle_secs();
        if self.storage.lock_stale_secs <= longest_cycle {
            anyhow::bail!(
                "storage.lock_stale_secs ({}) must exceed the longest cycle ({longest_cycle}s = max_attempts x generate_timeout_secs + publish_timeout_secs)",
                self.storage.lock_stale_secs
            );
        }
        self.pattern_set().context("Invalid pattern configuration")?;

        Ok(())
    }

    /// Local time offset
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.scheduler.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Built-in plus custom patterns, validated
    pub fn pattern_set(&self) -> Result<PatternSet> {
        Ok(PatternSet::with_custom(
            &self.patterns.custom,
            &self.patterns.default,
        )?)
    }

    pub fn scheduler(&self) -> PostingScheduler {
        PostingScheduler::new(self.timezone())
            .with_off_hours(self.scheduler.allow_off_hours)
            .with_backoff(self.scheduler.backoff.clone())
    }

    pub fn tracker(&self) -> DiversityTracker {
        DiversityTracker::new(self.diversity.clone())
    }

    pub fn quality_gate(&self) -> Result<QualityGate> {
        QualityGate::new(self.quality.clone()).context("Invalid quality rules")
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}
