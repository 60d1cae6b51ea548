//! Interfaces to the content generator and the publisher
//!
//! The desk never generates or publishes anything itself. It hands a
//! [`GenerationHint`] to a [`ContentSource`] and an accepted candidate to a
//! [`PublishTarget`], and records whatever comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::diversity::Recommendation;
use crate::models::ContentCandidate;

/// Errors raised by collaborators
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// The call did not finish in time
    #[error("{role} timed out after {}s", after.as_secs())]
    Timeout { role: &'static str, after: Duration },

    /// The call was abandoned on request (interrupt or shutdown)
    #[error("{role} call cancelled")]
    Cancelled { role: &'static str },

    /// External command exited unsuccessfully
    #[error("{role} command failed: {detail}")]
    Command { role: &'static str, detail: String },

    /// Output could not be understood
    #[error("{role} returned invalid output: {detail}")]
    InvalidOutput { role: &'static str, detail: String },

    /// The publisher refused the post
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// Pipe or spawn failure
    #[error("I/O error talking to {role}: {source}")]
    Io {
        role: &'static str,
        #[source]
        source: io::Error,
    },
}

impl CollaboratorError {
    /// Timeouts and transport failures may succeed on the next cycle
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled { .. } | Self::Command { .. } | Self::Io { .. } => {
                true
            }
            Self::InvalidOutput { .. } | Self::Rejected(_) => false,
        }
    }
}

/// What the generator should aim for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationHint {
    /// 1-based attempt within the cycle
    pub attempt: u32,

    /// Active posting pattern
    pub pattern: String,

    pub recommendation: Recommendation,

    /// Why earlier attempts in this cycle were turned away
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<String>,
}

/// What the publisher reports back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Produces candidates on request
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn generate(&self, hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError>;
}

/// Publishes accepted, normalized candidates
#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn publish(&self, post: &ContentCandidate) -> Result<PublishReceipt, CollaboratorError>;
}
