//! One evaluate, generate, gate, publish and record pass
//!
//! The state lock is held for the whole pass so two overlapping invocations
//! cannot both see an open slot and both publish into it. It is refreshed
//! before every collaborator call; a cycle that finds it taken over stops
//! without publishing. Otherwise whatever happens after an eligible decision
//! ends in exactly one history record, cancellation included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{AttemptOutcome, ContentCandidate, Fingerprint, PostingRecord};
use crate::outcome::Outcome;
use crate::pattern::PostingPattern;
use crate::scheduler::{Decision, SkipReason, UnitDraw};
use crate::storage::{PersistedState, StorageError, StoreLock};
use crate::utils::truncate_text;

use super::collaborator::{
    CollaboratorError, ContentSource, GenerationHint, PublishReceipt, PublishTarget,
};
use super::{PostingDesk, LOCK_RETRY_DELAY};

/// Cycle limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Candidates requested before the cycle gives up
    pub max_attempts: u32,

    pub generate_timeout_secs: u64,

    pub publish_timeout_secs: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generate_timeout_secs: 300,
            publish_timeout_secs: 60,
        }
    }
}

impl CycleSettings {
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Upper bound on one cycle's collaborator time, in seconds
    pub fn longest_cycle_secs(&self) -> u64 {
        u64::from(self.max_attempts)
            .saturating_mul(self.generate_timeout_secs)
            .saturating_add(self.publish_timeout_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == 0 {
            return Err("cycle.max_attempts must be greater than 0".to_string());
        }
        if self.generate_timeout_secs == 0 || self.publish_timeout_secs == 0 {
            return Err("cycle timeouts must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Published {
        title: String,
        fingerprint: Fingerprint,
        receipt: PublishReceipt,
    },

    /// Natural skip drawn; nothing was generated
    Skipped { reason: SkipReason },

    /// Every candidate was turned away by the gates
    Rejected { attempts: u32, reasons: Vec<String> },

    /// A collaborator failed or timed out
    Failed { stage: String, error: String },
}

/// Everything a cycle decided and recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub pattern: String,
    pub decision: Decision,

    /// Candidates requested
    pub attempts: u32,

    pub outcome: CycleOutcome,

    /// The history entry written for this cycle
    pub record: PostingRecord,
}

/// Longest failure note kept in history
const MAX_NOTE_CHARS: usize = 500;

struct Production {
    outcome: CycleOutcome,
    attempts: u32,
    record: PostingRecord,
    published: Option<(ContentCandidate, Fingerprint)>,
}

impl PostingDesk {
    /// Evaluate now and, when eligible, generate, gate, publish and record
    ///
    /// A blocked decision returns [`Outcome::Blocked`] without recording.
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        source: &dyn ContentSource,
        target: &dyn PublishTarget,
        settings: &CycleSettings,
        draw: &mut (dyn UnitDraw + Send),
    ) -> Result<Outcome<CycleReport>> {
        self.run_cycle_until(now, source, target, settings, draw, std::future::pending())
            .await
    }

    /// [`run_cycle`](Self::run_cycle), abandoning the collaborator call in
    /// flight once `cancel` completes
    ///
    /// The abandoned attempt is recorded as failed.
    pub async fn run_cycle_until(
        &self,
        now: DateTime<Utc>,
        source: &dyn ContentSource,
        target: &dyn PublishTarget,
        settings: &CycleSettings,
        draw: &mut (dyn UnitDraw + Send),
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<Outcome<CycleReport>> {
        let cancel = std::pin::pin!(cancel);
        let lock = self.lock_state_async().await?;
        let loaded = self.store().load()?;
        let pattern = self.active_pattern(&loaded.state).clone();

        let decision =
            self.scheduler()
                .evaluate(now, &loaded.state.schedule.records, &pattern, draw);

        let production = match &decision {
            Decision::Blocked(reason) => {
                tracing::info!(pattern = %pattern.name, reason = %reason, "Posting blocked");
                return Ok(Outcome::Blocked {
                    reason: reason.clone(),
                });
            }
            Decision::Skipped(reason) => Production {
                outcome: CycleOutcome::Skipped {
                    reason: reason.clone(),
                },
                attempts: 0,
                record: PostingRecord::new(now, AttemptOutcome::Skipped).with_note(reason.to_string()),
                published: None,
            },
            Decision::Eligible => {
                self.produce(now, &pattern, &loaded.state, &lock, source, target, settings, cancel)
                    .await?
            }
        };

        let record = production.record.with_pattern(pattern.name.clone());
        let published = production.published;

        // On a revision conflict the fresh state must still allow this record
        let still_valid = |state: &PersistedState| -> Result<()> {
            let pattern = self.active_pattern(state);
            match self.scheduler().first_block(now, &state.schedule.records, pattern) {
                Some(reason) => Err(Error::Storage(StorageError::Superseded {
                    detail: format!("another invocation recorded first; posting is now blocked: {reason}"),
                })),
                None => Ok(()),
            }
        };
        let committed = self.commit_checked(loaded, still_valid, |state| {
            self.scheduler()
                .record_attempt(&mut state.schedule.records, record.clone());
            if let Some((post, fingerprint)) = &published {
                self.tracker().record_published(
                    &mut state.diversity.entries,
                    post,
                    fingerprint.clone(),
                    now,
                );
            }
        });
        let (_, warnings) = committed.inspect_err(|e| {
            if let Some((post, fingerprint)) = &published {
                tracing::error!(
                    title = %post.title,
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Published post could not be recorded"
                );
            }
        })?;

        let report = CycleReport {
            pattern: pattern.name,
            decision,
            attempts: production.attempts,
            outcome: production.outcome,
            record,
        };
        Ok(Outcome::with_warnings(report, &warnings))
    }

    async fn lock_state_async(&self) -> Result<StoreLock> {
        match self.store().lock() {
            Err(e) if e.is_lock_held() => {
                tracing::info!(error = %e, "State locked, retrying once");
                tokio::time::sleep(LOCK_RETRY_DELAY).await;
                Ok(self.store().lock()?)
            }
            other => Ok(other?),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn produce<C>(
        &self,
        now: DateTime<Utc>,
        pattern: &PostingPattern,
        state: &PersistedState,
        lock: &StoreLock,
        source: &dyn ContentSource,
        target: &dyn PublishTarget,
        settings: &CycleSettings,
        mut cancel: Pin<&mut C>,
    ) -> Result<Production>
    where
        C: Future<Output = ()>,
    {
        let window = &state.diversity.entries;
        let mut feedback: Vec<String> = Vec::new();

        for attempt in 1..=settings.max_attempts {
            let hint = GenerationHint {
                attempt,
                pattern: pattern.name.clone(),
                recommendation: self.tracker().recommend_next(window),
                feedback: feedback.clone(),
            };

            lock.refresh()?;
            let generated = call(
                "generator",
                settings.generate_timeout(),
                source.generate(&hint),
                cancel.as_mut(),
            )
            .await;
            let raw = match generated {
                Ok(candidate) => candidate,
                Err(e) => return Ok(failure(now, attempt, "generate", &e, None)),
            };

            let verdict = self.gate().evaluate(&raw.title, &raw.body, state.published_fingerprints());
            if !verdict.passed {
                tracing::info!(attempt, title = %raw.title, summary = %verdict.summary(), "Candidate failed quality gate");
                feedback.push(format!("quality: {}", verdict.summary()));
                continue;
            }

            let normalized = ContentCandidate {
                title: verdict.normalized_title.clone(),
                body: verdict.normalized_body.clone(),
                ..raw
            };
            let post = self.tracker().prepare(&normalized);
            let judged = self.tracker().judge(&post, &verdict.fingerprint, window);
            if let Some(rejection) = judged.rejection {
                feedback.push(format!("diversity: {rejection}"));
                continue;
            }

            let fingerprint = verdict.fingerprint;
            lock.refresh()?;
            let sent = call(
                "publisher",
                settings.publish_timeout(),
                target.publish(&post),
                cancel.as_mut(),
            )
            .await;
            return Ok(match sent {
                Ok(receipt) => {
                    tracing::info!(
                        attempt,
                        title = %post.title,
                        category = %post.category,
                        id = receipt.id.as_deref().unwrap_or("-"),
                        "Post published"
                    );
                    Production {
                        outcome: CycleOutcome::Published {
                            title: post.title.clone(),
                            fingerprint: fingerprint.clone(),
                            receipt,
                        },
                        attempts: attempt,
                        record: PostingRecord::new(now, AttemptOutcome::Succeeded)
                            .with_content(&post, fingerprint.clone()),
                        published: Some((post, fingerprint)),
                    }
                }
                Err(e) => failure(now, attempt, "publish", &e, Some((&post, fingerprint))),
            });
        }

        let attempts = settings.max_attempts;
        tracing::warn!(attempts, "No acceptable candidate this cycle");
        Ok(Production {
            record: PostingRecord::new(now, AttemptOutcome::Failed).with_note(truncate_text(
                &format!(
                    "content rejected after {attempts} attempt(s): {}",
                    feedback.join("; ")
                ),
                MAX_NOTE_CHARS,
            )),
            outcome: CycleOutcome::Rejected {
                attempts,
                reasons: feedback,
            },
            attempts,
            published: None,
        })
    }
}

/// A collaborator call bounded by a timeout and by `cancel`
async fn call<T, C>(
    role: &'static str,
    after: Duration,
    work: impl Future<Output = std::result::Result<T, CollaboratorError>>,
    cancel: Pin<&mut C>,
) -> std::result::Result<T, CollaboratorError>
where
    C: Future<Output = ()>,
{
    tokio::select! {
        result = with_timeout(role, after, work) => result,
        () = cancel => Err(CollaboratorError::Cancelled { role }),
    }
}

async fn with_timeout<T>(
    role: &'static str,
    after: Duration,
    call: impl Future<Output = std::result::Result<T, CollaboratorError>>,
) -> std::result::Result<T, CollaboratorError> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout { role, after }),
    }
}

fn failure(
    now: DateTime<Utc>,
    attempt: u32,
    stage: &str,
    error: &CollaboratorError,
    content: Option<(&ContentCandidate, Fingerprint)>,
) -> Production {
    tracing::warn!(attempt, stage, error = %error, "Posting attempt failed");
    let mut record = PostingRecord::new(now, AttemptOutcome::Failed)
        .with_note(truncate_text(&format!("{stage} failed: {error}"), MAX_NOTE_CHARS));
    if let Some((post, fingerprint)) = content {
        record = record.with_content(post, fingerprint);
    }
    Production {
        outcome: CycleOutcome::Failed {
            stage: stage.to_string(),
            error: error.to_string(),
        },
        attempts: attempt,
        record,
        published: None,
    }
}
