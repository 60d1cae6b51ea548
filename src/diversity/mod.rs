//! Content diversity tracking
//!
//! Keeps a rolling window of what was published and scores new candidates
//! for novelty along three axes: category share, keyword overlap and
//! style/angle rotation. A near-duplicate of any single recent item is
//! rejected outright whatever its aggregate score.

pub mod keywords;
pub mod report;
pub mod similarity;
pub mod tracker;
pub mod window;

pub use keywords::{extract_keywords, TopicCatalog, FALLBACK_CATEGORY};
pub use report::DiversityReport;
pub use similarity::{jaccard, Jaccard, Similarity};
pub use tracker::{
    ClosestMatch, DiversityRejection, DiversityScore, DiversitySettings, DiversityTracker,
    DiversityVerdict, DiversityWeights, Recommendation,
};
pub use window::{DiversityWindow, DEFAULT_WINDOW_CAPACITY};
