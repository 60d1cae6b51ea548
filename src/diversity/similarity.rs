//! Pluggable keyword-set similarity

use crate::models::KeywordSet;

/// Similarity measure between two keyword sets, in `[0, 1]`
pub trait Similarity: Send + Sync + std::fmt::Debug {
    fn similarity(&self, a: &KeywordSet, b: &KeywordSet) -> f64;

    fn name(&self) -> &'static str;
}

/// Token-set Jaccard index
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Similarity for Jaccard {
    fn similarity(&self, a: &KeywordSet, b: &KeywordSet) -> f64 {
        jaccard(a, b)
    }

    fn name(&self) -> &'static str {
        "jaccard"
    }
}

/// `|a ∩ b| / |a ∪ b|`; zero when either side is empty
pub fn jaccard(a: &KeywordSet, b: &KeywordSet) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
