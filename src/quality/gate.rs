//! Quality scoring over normalized content

use serde::Serialize;
use std::fmt;

use crate::models::Fingerprint;

use super::normalize::{Fix, Normalizer};
use super::{QualitySettings, ViolationKind};

/// A single quality problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,

    /// Occurrences behind this violation
    pub count: usize,

    /// Cannot be auto-fixed; fails the gate whatever the score
    pub blocking: bool,
}

impl Violation {
    fn from_fix(fix: Fix, field: &str) -> Self {
        Self {
            kind: fix.kind,
            detail: format!("{field}: {}", fix.detail),
            count: fix.count,
            blocking: !fix.applied,
        }
    }

    fn blocking(kind: ViolationKind, detail: String) -> Self {
        Self {
            kind,
            detail,
            count: 1,
            blocking: true,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)?;
        if self.blocking {
            write!(f, " (blocking)")?;
        }
        Ok(())
    }
}

/// Outcome of the gate for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub score: u32,
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub normalized_title: String,
    pub normalized_body: String,

    /// Fingerprint of the normalized body
    pub fingerprint: Fingerprint,
}

impl QualityVerdict {
    pub fn has_blocking(&self) -> bool {
        self.violations.iter().any(|v| v.blocking)
    }

    pub fn count_kind(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    /// Short one-line summary for logs and failure notes
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            return format!("score {}", self.score);
        }
        let kinds: Vec<&str> = self.violations.iter().map(|v| v.kind.id()).collect();
        format!("score {} ({})", self.score, kinds.join(", "))
    }
}

/// Stateless content evaluator
#[derive(Debug, Clone)]
pub struct QualityGate {
    settings: QualitySettings,
    normalizer: Normalizer,
}

impl QualityGate {
    pub fn new(settings: QualitySettings) -> Result<Self, regex::Error> {
        let normalizer = Normalizer::new(&settings)?;
        Ok(Self {
            settings,
            normalizer,
        })
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalize title and body, then score the result
    ///
    /// `prior` holds fingerprints of already-published bodies.
    pub fn evaluate<'a, I>(&self, title: &str, body: &str, prior: I) -> QualityVerdict
    where
        I: IntoIterator<Item = &'a Fingerprint>,
    {
        let title_pass = self.normalizer.normalize(title);
        let body_pass = self.normalizer.normalize(body);

        let mut violations: Vec<Violation> = title_pass
            .fixes
            .into_iter()
            .map(|f| Violation::from_fix(f, "title"))
            .chain(body_pass.fixes.into_iter().map(|f| Violation::from_fix(f, "body")))
            .collect();

        let normalized_body = body_pass.text;
        let chars = normalized_body.chars().count();
        let words = normalized_body.split_whitespace().count();
        if chars < self.settings.min_chars || words < self.settings.min_words {
            violations.push(Violation::blocking(
                ViolationKind::TooShort,
                format!(
                    "body has {chars} chars and {words} words, needs {} and {}",
                    self.settings.min_chars, self.settings.min_words
                ),
            ));
        }

        let fingerprint = Fingerprint::of_text(&normalized_body);
        if prior.into_iter().any(|p| p == &fingerprint) {
            violations.push(Violation::blocking(
                ViolationKind::Duplicate,
                format!("body matches published content {}", fingerprint.short()),
            ));
        }

        violations.sort_by_key(|v| v.kind);

        let penalty: u32 = violations
            .iter()
            .map(|v| self.settings.penalties.for_kind(v.kind))
            .sum();
        let mut score = 100u32.saturating_sub(penalty);
        let blocked = violations.iter().any(|v| v.blocking);
        if blocked {
            // Blocking problems always land below the threshold
            score = score.min(self.settings.pass_threshold.saturating_sub(1));
        }
        let passed = score >= self.settings.pass_threshold && !blocked;

        let verdict = QualityVerdict {
            score,
            passed,
            violations,
            normalized_title: title_pass.text,
            normalized_body,
            fingerprint,
        };

        tracing::debug!(
            title = %verdict.normalized_title,
            passed = verdict.passed,
            summary = %verdict.summary(),
            "Quality gate evaluated"
        );

        verdict
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        let settings = QualitySettings::default();
        let normalizer = Normalizer::new(&settings).expect("default quality rules compile");
        Self {
            settings,
            normalizer,
        }
    }
}
