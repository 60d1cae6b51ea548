//! Result shape of operator-facing operations
//!
//! Blocked decisions, bad input and recovered storage are normal answers, not
//! failures. Only genuine write failures and repeated conflicts become
//! [`Error`](crate::error::Error).

use serde::Serialize;

use crate::scheduler::BlockReason;
use crate::storage::StorageWarning;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok { value: T },

    /// The scheduler refused; nothing was recorded
    Blocked { reason: BlockReason },

    /// Rejected before any state was touched
    InvalidInput { message: String },

    /// Computed from state recovered as empty after corruption
    StorageCorrupt {
        value: T,
        warnings: Vec<StorageWarning>,
    },
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// `Ok`, or `StorageCorrupt` when any warning indicates lost data
    pub fn with_warnings(value: T, warnings: &[StorageWarning]) -> Self {
        let degraded: Vec<StorageWarning> = warnings
            .iter()
            .filter(|w| !w.is_informational())
            .cloned()
            .collect();
        if degraded.is_empty() {
            Self::Ok { value }
        } else {
            Self::StorageCorrupt {
                value,
                warnings: degraded,
            }
        }
    }

    /// The computed value, if the operation produced one
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value } | Self::StorageCorrupt { value, .. } => Some(value),
            Self::Blocked { .. } | Self::InvalidInput { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ok { value } | Self::StorageCorrupt { value, .. } => Some(value),
            Self::Blocked { .. } | Self::InvalidInput { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn warnings(&self) -> &[StorageWarning] {
        match self {
            Self::StorageCorrupt { warnings, .. } => warnings,
            _ => &[],
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ok { value } => Outcome::Ok { value: f(value) },
            Self::StorageCorrupt { value, warnings } => Outcome::StorageCorrupt {
                value: f(value),
                warnings,
            },
            Self::Blocked { reason } => Outcome::Blocked { reason },
            Self::InvalidInput { message } => Outcome::InvalidInput { message },
        }
    }
}
