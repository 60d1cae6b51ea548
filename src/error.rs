//! Unified error handling for the pacer crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors usable on their own.
//!
//! # Architecture
//!
//! - [`PacerErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Rejected content, blocked decisions and recovered storage are not errors;
//! they travel in [`Outcome`](crate::outcome::Outcome).

use std::io;
use thiserror::Error;

pub use crate::desk::collaborator::CollaboratorError;
pub use crate::pattern::error::PatternError;
pub use crate::storage::error::StorageError;

/// Common trait for all pacer error types
pub trait PacerErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration and validation errors
    Config,
    /// Storage and I/O errors
    Storage,
    /// Concurrent writers touched the same state
    Concurrency,
    /// Content generator or publisher failures
    Collaborator,
    /// Serialization errors
    Parsing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Config => "configuration error",
            Self::Storage => "storage error",
            Self::Concurrency => "concurrency conflict",
            Self::Collaborator => "collaborator error",
            Self::Parsing => "parsing error",
            Self::Other => "other error",
        }
    }
}

/// Unified error type for the pacer crate
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown or invalid posting pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// Persisted state could not be written or locked
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Content source or publish target failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PacerErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Pattern(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Collaborator(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Pattern(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Storage(e) if e.is_contention() => ErrorCategory::Concurrency,
            Self::Storage(_) | Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Collaborator(_) => ErrorCategory::Collaborator,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Rule sets are compiled from configuration
impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("invalid rule pattern: {err}"))
    }
}

// Edge errors from configuration loading
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
