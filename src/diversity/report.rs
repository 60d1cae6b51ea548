//! Window-level diversity summary for operators

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::tracker::{DiversityTracker, Recommendation};
use super::window::DiversityWindow;

/// Entries examined by the window score and advice
const RECENT_SPAN: usize = 10;

/// Below this many entries the window is too small to judge
const MIN_ENTRIES: usize = 5;

/// Distinct categories that earn a full variety score
const TARGET_CATEGORIES: f64 = 5.0;

/// Pairwise similarity above which two recent items count as repetitive
const PAIR_SIMILARITY_LIMIT: f64 = 0.7;

const PAIR_PENALTY: f64 = 20.0;

/// Category count within the recent span that counts as over-represented
const OVERREPRESENTED_AFTER: usize = 3;

/// Minimum spread in body length expected across recent items
const LENGTH_SPREAD_CHARS: usize = 500;

const TOP_KEYWORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversityReport {
    pub total: usize,
    pub category_distribution: BTreeMap<String, usize>,
    pub top_keywords: Vec<(String, usize)>,
    pub diversity_score: f64,
    pub recommendation: Recommendation,
    pub advice: Vec<String>,
}

impl DiversityTracker {
    /// Summarize the window: distributions, aggregate score and advice
    pub fn report(&self, window: &DiversityWindow) -> DiversityReport {
        DiversityReport {
            total: window.len(),
            category_distribution: window.category_distribution(),
            top_keywords: window.top_keywords(TOP_KEYWORDS),
            diversity_score: self.window_score(window),
            recommendation: self.recommend_next(window),
            advice: self.advice(window),
        }
    }

    /// Category variety averaged with a penalty for similar recent pairs
    pub fn window_score(&self, window: &DiversityWindow) -> f64 {
        if window.len() < MIN_ENTRIES {
            return 100.0;
        }
        let recent = window.recent(RECENT_SPAN);

        let unique: BTreeSet<&str> = recent.iter().map(|e| e.category.as_str()).collect();
        let variety = (unique.len() as f64 / TARGET_CATEGORIES * 100.0).min(100.0);

        let mut similar_pairs = 0usize;
        for (i, a) in recent.iter().enumerate() {
            for b in &recent[i + 1..] {
                if self.similarity(&a.keywords, &b.keywords) > PAIR_SIMILARITY_LIMIT {
                    similar_pairs += 1;
                }
            }
        }
        let spread = (100.0 - similar_pairs as f64 * PAIR_PENALTY).max(0.0);

        (variety + spread) / 2.0
    }

    /// Human-readable suggestions for the next few posts
    pub fn advice(&self, window: &DiversityWindow) -> Vec<String> {
        if window.len() < MIN_ENTRIES {
            return vec!["Continue publishing to build diversity metrics".to_string()];
        }
        let recent = window.recent(RECENT_SPAN);
        let mut advice = Vec::new();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in recent {
            *counts.entry(entry.category.as_str()).or_insert(0) += 1;
        }
        for (category, count) in &counts {
            if *count > OVERREPRESENTED_AFTER {
                advice.push(format!("Reduce posts in '{category}' category"));
            }
        }

        let unused: Vec<String> = self
            .catalog()
            .category_names()
            .into_iter()
            .filter(|name| !counts.contains_key(name.as_str()))
            .collect();
        if !unused.is_empty() {
            advice.push(format!("Consider topics in: {}", unused.join(", ")));
        }

        let lengths = recent.iter().map(|e| e.body_chars);
        let spread = lengths.clone().max().unwrap_or(0) - lengths.min().unwrap_or(0);
        if spread < LENGTH_SPREAD_CHARS {
            advice.push("Vary content length more (short vs. long-form)".to_string());
        }

        if advice.is_empty() {
            advice.push("Content diversity looks good".to_string());
        }
        advice
    }
}
