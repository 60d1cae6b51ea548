//! Novelty scoring, hard duplicate gate and rotation recommendations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::models::{ContentCandidate, DiversityEntry, Fingerprint, KeywordSet};

use super::keywords::{extract_keywords, TopicCatalog};
use super::similarity::{Jaccard, Similarity};
use super::window::{DiversityWindow, DEFAULT_WINDOW_CAPACITY};

// ============================================================================
// Settings
// ============================================================================

/// Relative weights of the three sub-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityWeights {
    pub category: f64,
    pub keyword: f64,
    pub style: f64,
}

impl Default for DiversityWeights {
    fn default() -> Self {
        Self {
            category: 1.0,
            keyword: 1.0,
            style: 1.0,
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversitySettings {
    /// Published items remembered in the window
    pub window_capacity: usize,

    /// Recent entries compared for keyword overlap and near duplicates
    pub keyword_span: usize,

    /// Similarity to a single recent item at or above which a candidate is rejected
    pub near_duplicate_threshold: f64,

    /// Overall score below which a candidate is rejected
    pub min_overall: f64,

    pub weights: DiversityWeights,

    pub catalog: TopicCatalog,
}

impl Default for DiversitySettings {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            keyword_span: 10,
            near_duplicate_threshold: 0.8,
            min_overall: 40.0,
            weights: DiversityWeights::default(),
            catalog: TopicCatalog::default(),
        }
    }
}

impl DiversitySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_capacity == 0 {
            return Err("diversity.window_capacity must be greater than 0".to_string());
        }
        if self.keyword_span == 0 {
            return Err("diversity.keyword_span must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.near_duplicate_threshold) {
            return Err("diversity.near_duplicate_threshold must be within 0.0-1.0".to_string());
        }
        if !(0.0..=100.0).contains(&self.min_overall) {
            return Err("diversity.min_overall must be within 0-100".to_string());
        }
        let w = &self.weights;
        if [w.category, w.keyword, w.style].iter().any(|x| !x.is_finite() || *x < 0.0)
            || w.category + w.keyword + w.style <= 0.0
        {
            return Err("diversity.weights must be non-negative with a positive sum".to_string());
        }
        self.catalog.validate()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Closest recent item by keyword similarity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosestMatch {
    pub title: String,
    pub similarity: f64,
}

/// Novelty of a candidate against the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversityScore {
    pub overall: f64,
    pub category_score: f64,
    pub keyword_score: f64,
    pub style_score: f64,

    /// Most similar recent item, if any was compared
    pub closest: Option<ClosestMatch>,

    /// Closest similarity reached the hard threshold
    pub near_duplicate: bool,
}

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiversityRejection {
    /// Keyword overlap with a single recent item at or above the threshold
    NearDuplicate {
        title: String,
        similarity: f64,
        threshold: f64,
    },

    /// Same fingerprint as an item in the window
    RepeatedContent { fingerprint: Fingerprint },

    /// Aggregate novelty below the configured minimum
    LowScore { overall: f64, minimum: f64 },
}

impl DiversityRejection {
    /// Hard rejections ignore the aggregate score entirely
    pub fn is_hard(&self) -> bool {
        !matches!(self, Self::LowScore { .. })
    }
}

impl fmt::Display for DiversityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NearDuplicate {
                title, similarity, ..
            } => write!(f, "near duplicate of '{title}' (similarity {similarity:.2})"),
            Self::RepeatedContent { fingerprint } => {
                write!(f, "content already published ({})", fingerprint.short())
            }
            Self::LowScore { overall, minimum } => {
                write!(f, "diversity score {overall:.1} below minimum {minimum:.1}")
            }
        }
    }
}

/// Score plus the gate decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversityVerdict {
    pub score: DiversityScore,
    pub rejection: Option<DiversityRejection>,
}

impl DiversityVerdict {
    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// What generation should aim for next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub preferred_category: String,
    pub preferred_style: String,
    pub preferred_angle: String,
}

// ============================================================================
// Tracker
// ============================================================================

/// Scores candidates against the diversity window
#[derive(Debug, Clone)]
pub struct DiversityTracker {
    settings: DiversitySettings,
    similarity: Arc<dyn Similarity>,
}

impl DiversityTracker {
    pub fn new(settings: DiversitySettings) -> Self {
        Self {
            settings,
            similarity: Arc::new(Jaccard),
        }
    }

    /// Replace the default Jaccard measure
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn settings(&self) -> &DiversitySettings {
        &self.settings
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.settings.catalog
    }

    pub fn similarity(&self, a: &KeywordSet, b: &KeywordSet) -> f64 {
        self.similarity.similarity(a, b).clamp(0.0, 1.0)
    }

    /// Fill in category and keywords a generator left empty; lowercase keywords
    pub fn prepare(&self, candidate: &ContentCandidate) -> ContentCandidate {
        let mut prepared = candidate.clone();
        if prepared.category.trim().is_empty() {
            prepared.category = self.settings.catalog.categorize(&prepared.title);
        }
        prepared.keywords = prepared
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if prepared.keywords.is_empty() {
            prepared.keywords = extract_keywords(&format!("{} {}", prepared.title, prepared.body));
        }
        prepared
    }

    /// Pure novelty score of a candidate against a window
    pub fn score(&self, candidate: &ContentCandidate, window: &DiversityWindow) -> DiversityScore {
        let category_score = self.category_score(candidate, window);
        let keyword_score = self.keyword_score(candidate, window);
        let style_score = self.style_score(candidate, window);

        let w = &self.settings.weights;
        let total = w.category + w.keyword + w.style;
        let overall =
            (w.category * category_score + w.keyword * keyword_score + w.style * style_score) / total;

        let closest = self.closest(candidate, window);
        let near_duplicate = closest
            .as_ref()
            .is_some_and(|c| c.similarity >= self.settings.near_duplicate_threshold);

        DiversityScore {
            overall,
            category_score,
            keyword_score,
            style_score,
            closest,
            near_duplicate,
        }
    }

    /// Score and apply the hard and soft gates
    pub fn judge(
        &self,
        candidate: &ContentCandidate,
        fingerprint: &Fingerprint,
        window: &DiversityWindow,
    ) -> DiversityVerdict {
        let score = self.score(candidate, window);

        let rejection = if window.contains_fingerprint(fingerprint) {
            Some(DiversityRejection::RepeatedContent {
                fingerprint: fingerprint.clone(),
            })
        } else if let Some(closest) = score.closest.as_ref().filter(|_| score.near_duplicate) {
            Some(DiversityRejection::NearDuplicate {
                title: closest.title.clone(),
                similarity: closest.similarity,
                threshold: self.settings.near_duplicate_threshold,
            })
        } else if score.overall < self.settings.min_overall {
            Some(DiversityRejection::LowScore {
                overall: score.overall,
                minimum: self.settings.min_overall,
            })
        } else {
            None
        };

        if let Some(reason) = &rejection {
            tracing::info!(
                title = %candidate.title,
                overall = score.overall,
                reason = %reason,
                "Candidate rejected for diversity"
            );
        }

        DiversityVerdict { score, rejection }
    }

    /// Least-recently-used category, style and angle from the catalog
    pub fn recommend_next(&self, window: &DiversityWindow) -> Recommendation {
        let catalog = &self.settings.catalog;
        let entries = window.entries();

        Recommendation {
            preferred_category: least_recently_used(
                &catalog.category_names(),
                entries.iter().map(|e| e.category.as_str()),
            ),
            preferred_style: least_recently_used(
                &catalog.styles,
                entries.iter().map(|e| e.writing_style.as_str()),
            ),
            preferred_angle: least_recently_used(
                &catalog.angles,
                entries.iter().map(|e| e.angle.as_str()),
            ),
        }
    }

    /// Add an accepted, published candidate to the window
    pub fn record_published(
        &self,
        window: &mut DiversityWindow,
        candidate: &ContentCandidate,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) {
        tracing::info!(
            title = %candidate.title,
            category = %candidate.category,
            fingerprint = fingerprint.short(),
            "Recording published content"
        );
        window.push(
            DiversityEntry::from_candidate(candidate, fingerprint, now),
            self.settings.window_capacity,
        );
    }

    fn category_score(&self, candidate: &ContentCandidate, window: &DiversityWindow) -> f64 {
        if window.is_empty() {
            return 100.0;
        }
        let same = window
            .entries()
            .iter()
            .filter(|e| e.category.eq_ignore_ascii_case(&candidate.category))
            .count();
        100.0 * (1.0 - same as f64 / window.len() as f64)
    }

    fn keyword_score(&self, candidate: &ContentCandidate, window: &DiversityWindow) -> f64 {
        let recent_union: KeywordSet = window
            .recent(self.settings.keyword_span)
            .iter()
            .flat_map(|e| e.keywords.iter().cloned())
            .collect();
        100.0 - 100.0 * self.similarity(&candidate.keywords, &recent_union)
    }

    fn style_score(&self, candidate: &ContentCandidate, window: &DiversityWindow) -> f64 {
        let Some(previous) = window.last() else {
            return 100.0;
        };
        let style = candidate.writing_style.trim();
        let angle = candidate.angle.trim();

        let mut score: f64 = 100.0;
        if !style.is_empty() && style.eq_ignore_ascii_case(&previous.writing_style) {
            score -= 50.0;
        }
        if !angle.is_empty() && angle.eq_ignore_ascii_case(&previous.angle) {
            score -= 30.0;
        }

        let lookback = self.settings.catalog.styles.len().saturating_sub(1);
        let recent = window.recent(lookback);
        let earlier = &recent[..recent.len().saturating_sub(1)];
        if !style.is_empty()
            && earlier
                .iter()
                .any(|e| e.writing_style.eq_ignore_ascii_case(style))
        {
            score -= 20.0;
        }

        score.clamp(0.0, 100.0)
    }

    fn closest(&self, candidate: &ContentCandidate, window: &DiversityWindow) -> Option<ClosestMatch> {
        window
            .recent(self.settings.keyword_span)
            .iter()
            .map(|e| ClosestMatch {
                title: e.title.clone(),
                similarity: self.similarity(&candidate.keywords, &e.keywords),
            })
            // Newest wins ties so the report names the latest offender
            .fold(None, |best: Option<ClosestMatch>, m| match best {
                Some(b) if b.similarity > m.similarity => Some(b),
                _ => Some(m),
            })
    }
}

impl Default for DiversityTracker {
    fn default() -> Self {
        Self::new(DiversitySettings::default())
    }
}

/// Never-used options first, then the oldest last use, then lowest
/// frequency, then catalog order
fn least_recently_used<'a>(options: &[String], used: impl Iterator<Item = &'a str>) -> String {
    let used: Vec<&str> = used.collect();
    options
        .iter()
        .enumerate()
        .min_by_key(|(order, option)| {
            let last_use = used.iter().rposition(|u| u.eq_ignore_ascii_case(option));
            let frequency = used.iter().filter(|u| u.eq_ignore_ascii_case(option)).count();
            (last_use, frequency, *order)
        })
        .map(|(_, option)| option.clone())
        .unwrap_or_default()
}
