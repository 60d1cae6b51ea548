//! Keyword extraction and topic catalog

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use crate::models::KeywordSet;
use crate::utils::strip_tags;

static WORD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-z]{4,}\b").unwrap());

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "this", "that", "with", "have", "will", "from", "they", "know", "want", "been", "good",
        "much", "some", "time", "very", "when", "come", "here", "just", "like", "long", "make",
        "many", "over", "such", "take", "than", "them", "well", "were", "what", "your", "there",
        "their", "about", "would", "could", "should", "these", "those", "into", "also", "more",
        "most", "only", "other", "which", "while", "where",
    ]
    .into_iter()
    .collect()
});

/// Lowercase words of four or more letters, minus stop words and markup
pub fn extract_keywords(text: &str) -> KeywordSet {
    let clean = strip_tags(text).to_lowercase();
    WORD_REGEX
        .find_iter(&clean)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Category used when no catalog entry matches
pub const FALLBACK_CATEGORY: &str = "general";

/// Categories, writing styles and angles that generation rotates through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicCatalog {
    /// Category name to trigger words found in topics
    pub categories: BTreeMap<String, Vec<String>>,

    pub styles: Vec<String>,

    pub angles: Vec<String>,
}

impl Default for TopicCatalog {
    fn default() -> Self {
        let categories = [
            ("technology", &["ai", "software", "programming", "tech", "digital", "innovation"][..]),
            ("business", &["marketing", "startup", "entrepreneur", "finance", "strategy"][..]),
            ("lifestyle", &["health", "fitness", "travel", "food", "wellness", "productivity"][..]),
            ("education", &["learning", "skills", "training", "development", "course"][..]),
            ("entertainment", &["movies", "games", "music", "books", "culture"][..]),
            ("news", &["trends", "current", "breaking", "update", "latest"][..]),
        ]
        .into_iter()
        .map(|(name, words)| {
            (
                name.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect();

        let styles = ["conversational", "analytical", "storytelling", "listicle", "tutorial", "opinion"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let angles = [
            "how-to guide",
            "trend analysis",
            "comparison review",
            "beginner's guide",
            "expert tips",
            "case study",
            "myth busting",
            "future predictions",
            "problem solving",
            "best practices",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            categories,
            styles,
            angles,
        }
    }
}

impl TopicCatalog {
    /// First catalog category whose trigger word appears in the topic
    pub fn categorize(&self, topic: &str) -> String {
        let words: HashSet<String> = topic
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        self.categories
            .iter()
            .find(|(_, triggers)| triggers.iter().any(|t| words.contains(&t.to_lowercase())))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.categories.is_empty() {
            return Err("catalog.categories must not be empty".to_string());
        }
        if self.styles.is_empty() {
            return Err("catalog.styles must not be empty".to_string());
        }
        if self.angles.is_empty() {
            return Err("catalog.angles must not be empty".to_string());
        }
        Ok(())
    }
}
