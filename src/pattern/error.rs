//! Error types for the pattern module

use std::fmt;

/// Result type for pattern operations
pub type PatternResult<T> = Result<T, PatternError>;

/// Pattern lookup and validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum PatternError {
    /// No pattern registered under this name
    UnknownPattern {
        name: String,
        valid_options: Vec<String>,
    },

    /// A numeric field is zero or negative
    NonPositive {
        pattern: String,
        field: String,
    },

    /// min_delay_hours exceeds max_delay_hours
    DelayRange {
        pattern: String,
        min: u32,
        max: u32,
    },

    /// max_delay_hours beyond the supported span
    DelayTooLong {
        pattern: String,
        max: u32,
        limit: u32,
    },

    /// Skip probability outside [0, 1]
    InvalidProbability {
        pattern: String,
        value: f64,
    },

    /// Preferred hour outside 0-23
    InvalidHour {
        pattern: String,
        hour: u8,
    },

    /// Pattern name is empty
    EmptyName,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPattern {
                name,
                valid_options,
            } => {
                write!(
                    f,
                    "Unknown pattern '{}'. Valid options: {}",
                    name,
                    valid_options.join(", ")
                )
            }
            Self::NonPositive { pattern, field } => {
                write!(f, "Pattern '{}': {} must be positive", pattern, field)
            }
            Self::DelayRange { pattern, min, max } => {
                write!(
                    f,
                    "Pattern '{}': min_delay_hours ({}) exceeds max_delay_hours ({})",
                    pattern, min, max
                )
            }
            Self::DelayTooLong { pattern, max, limit } => {
                write!(
                    f,
                    "Pattern '{}': max_delay_hours ({}) exceeds {} hours",
                    pattern, max, limit
                )
            }
            Self::InvalidProbability { pattern, value } => {
                write!(
                    f,
                    "Pattern '{}': random_skip_probability {} must be within 0.0-1.0",
                    pattern, value
                )
            }
            Self::InvalidHour { pattern, hour } => {
                write!(
                    f,
                    "Pattern '{}': invalid preferred hour {}. Must be 0-23",
                    pattern, hour
                )
            }
            Self::EmptyName => write!(f, "Pattern name must not be empty"),
        }
    }
}

impl std::error::Error for PatternError {}

impl PatternError {
    /// Create an unknown pattern error
    pub fn unknown(name: impl Into<String>, valid_options: Vec<String>) -> Self {
        Self::UnknownPattern {
            name: name.into(),
            valid_options,
        }
    }

    /// Create a non-positive field error
    pub fn non_positive(pattern: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NonPositive {
            pattern: pattern.into(),
            field: field.into(),
        }
    }

    /// Configuration mistakes never succeed on retry
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
