//! Rolling window of published-item summaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{DiversityEntry, Fingerprint};

/// Default number of published items remembered
pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

/// Bounded, chronological list of recently published items
///
/// Frequency tables are derived on demand from the entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiversityWindow {
    entries: Vec<DiversityEntry>,
}

impl DiversityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DiversityEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry and drop the oldest beyond `capacity`
    pub fn push(&mut self, entry: DiversityEntry, capacity: usize) {
        self.entries.push(entry);
        let excess = self.entries.len().saturating_sub(capacity.max(1));
        if excess > 0 {
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[DiversityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn last(&self) -> Option<&DiversityEntry> {
        self.entries.last()
    }

    /// The newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> &[DiversityEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn category_distribution(&self) -> BTreeMap<String, usize> {
        count_by(self.entries.iter().map(|e| e.category.as_str()))
    }

    pub fn keyword_frequency(&self) -> BTreeMap<String, usize> {
        count_by(
            self.entries
                .iter()
                .flat_map(|e| e.keywords.iter().map(String::as_str)),
        )
    }

    /// Most frequent keywords, ties broken alphabetically
    pub fn top_keywords(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<_> = self.keyword_frequency().into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn contains_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.iter().any(|e| &e.fingerprint == fingerprint)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.entries.iter().map(|e| &e.fingerprint)
    }
}

fn count_by<'a>(items: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items.filter(|s| !s.is_empty()) {
        *counts.entry(item.to_string()).or_insert(0) += 1;
    }
    counts
}
