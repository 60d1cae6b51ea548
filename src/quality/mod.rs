//! Spam and quality gate
//!
//! Two passes over each candidate: [`Normalizer`] applies the safe
//! auto-fixes, then [`QualityGate`] scores what remains. Neither pass keeps
//! state; prior fingerprints are supplied by the caller.

pub mod gate;
pub mod normalize;

pub use gate::{QualityGate, QualityVerdict, Violation};
pub use normalize::{BannedPhrase, Fix, FixPolicy, Normalized, Normalizer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of quality problems, in the order they are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    BannedPhrase,
    PunctuationAbuse,
    CapsAbuse,
    TooShort,
    Duplicate,
}

impl ViolationKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::BannedPhrase => "banned_phrase",
            Self::PunctuationAbuse => "punctuation_abuse",
            Self::CapsAbuse => "caps_abuse",
            Self::TooShort => "too_short",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Points subtracted from 100 per violation of each kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPenalties {
    pub banned_phrase: u32,
    pub punctuation_abuse: u32,
    pub caps_abuse: u32,
    pub too_short: u32,
    pub duplicate: u32,
}

impl Default for QualityPenalties {
    fn default() -> Self {
        Self {
            banned_phrase: 15,
            punctuation_abuse: 5,
            caps_abuse: 10,
            too_short: 50,
            duplicate: 60,
        }
    }
}

impl QualityPenalties {
    pub fn for_kind(&self, kind: ViolationKind) -> u32 {
        match kind {
            ViolationKind::BannedPhrase => self.banned_phrase,
            ViolationKind::PunctuationAbuse => self.punctuation_abuse,
            ViolationKind::CapsAbuse => self.caps_abuse,
            ViolationKind::TooShort => self.too_short,
            ViolationKind::Duplicate => self.duplicate,
        }
    }
}

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub banned_phrases: Vec<BannedPhrase>,

    /// Longest allowed run of `!`/`?`
    pub max_repeated_punctuation: usize,

    /// All-caps words shorter than this are left alone
    pub caps_min_len: usize,

    /// All-caps words never re-cased
    pub acronyms: Vec<String>,

    /// Minimum normalized body length in characters
    pub min_chars: usize,

    /// Minimum normalized body length in words
    pub min_words: usize,

    /// Score needed to pass, 0-100
    pub pass_threshold: u32,

    pub penalties: QualityPenalties,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            banned_phrases: vec![
                BannedPhrase::strip("click here"),
                BannedPhrase::strip("buy now"),
                BannedPhrase::strip("limited time"),
                BannedPhrase::strip("act now"),
                BannedPhrase::strip("order now"),
                BannedPhrase::replace("risk free", "low risk"),
                BannedPhrase::block("100% free"),
                BannedPhrase::block("make money fast"),
            ],
            max_repeated_punctuation: 1,
            caps_min_len: 4,
            acronyms: ["HTML", "HTTP", "HTTPS", "JSON", "NASA", "NATO", "UNESCO", "COVID"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            min_chars: 200,
            min_words: 30,
            pass_threshold: 60,
            penalties: QualityPenalties::default(),
        }
    }
}

impl QualitySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.pass_threshold > 100 {
            return Err("quality.pass_threshold must be within 0-100".to_string());
        }
        if self.max_repeated_punctuation == 0 {
            return Err("quality.max_repeated_punctuation must be at least 1".to_string());
        }
        if self.caps_min_len < 2 {
            return Err("quality.caps_min_len must be at least 2".to_string());
        }
        for phrase in &self.banned_phrases {
            if phrase.phrase.trim().is_empty() {
                return Err("quality.banned_phrases entries must not be empty".to_string());
            }
            if phrase.policy == FixPolicy::Replace && phrase.replacement.is_none() {
                return Err(format!(
                    "quality.banned_phrases '{}' uses replace without a replacement",
                    phrase.phrase
                ));
            }
        }
        let normalizer = Normalizer::new(self).map_err(|e| format!("quality rules: {e}"))?;
        match normalizer.replacement_conflict() {
            Some(conflict) => Err(format!("quality.banned_phrases: {conflict}")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(QualitySettings::default().validate().is_ok());
    }

    #[test]
    fn test_replace_without_replacement_rejected() {
        let settings = QualitySettings {
            banned_phrases: vec![BannedPhrase {
                phrase: "deal".to_string(),
                policy: FixPolicy::Replace,
                replacement: None,
            }],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_phrases_from_toml() {
        let settings: QualitySettings = toml::from_str(
            r#"
            pass_threshold = 70
            [[banned_phrases]]
            phrase = "subscribe today"
            [[banned_phrases]]
            phrase = "guaranteed"
            policy = "block"
            "#,
        )
        .unwrap();
        assert_eq!(settings.pass_threshold, 70);
        assert_eq!(settings.banned_phrases[0].policy, FixPolicy::Strip);
        assert_eq!(settings.banned_phrases[1].policy, FixPolicy::Block);
        assert_eq!(settings.min_words, 30);
    }
}
