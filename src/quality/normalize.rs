//! Auto-fix pass of the quality gate
//!
//! Normalization is pure and idempotent: running it over its own output
//! changes nothing. Passes run in a fixed order (banned phrases, spacing,
//! punctuation, capitals, line tidy) so no later pass can reintroduce what an
//! earlier one removed.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::utils::tidy_lines;

use super::{QualitySettings, ViolationKind};

static SPACE_BEFORE_PUNCT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.;:!?])").unwrap());

/// Upper bound on banned-phrase passes; replacements are validated not to
/// reintroduce phrases so the loop settles well before this
const MAX_PHRASE_PASSES: usize = 8;

/// What to do with a banned phrase found in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixPolicy {
    /// Remove the phrase
    Strip,
    /// Swap in the configured replacement
    Replace,
    /// Leave the text alone and fail the gate
    Block,
}

/// A configured banned phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedPhrase {
    pub phrase: String,

    #[serde(default = "default_policy")]
    pub policy: FixPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

fn default_policy() -> FixPolicy {
    FixPolicy::Strip
}

impl BannedPhrase {
    pub fn strip(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            policy: FixPolicy::Strip,
            replacement: None,
        }
    }

    pub fn replace(phrase: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            policy: FixPolicy::Replace,
            replacement: Some(replacement.into()),
        }
    }

    pub fn block(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            policy: FixPolicy::Block,
            replacement: None,
        }
    }

    /// Case-insensitive, word-bounded, any whitespace between words
    fn pattern(&self) -> Result<Regex, regex::Error> {
        let words: Vec<String> = self.phrase.split_whitespace().map(regex::escape).collect();
        let body = words.join(r"\s+");
        let starts_word = self.phrase.trim().starts_with(|c: char| c.is_alphanumeric());
        let ends_word = self.phrase.trim().ends_with(|c: char| c.is_alphanumeric());
        Regex::new(&format!(
            "(?i){}{}{}",
            if starts_word { r"\b" } else { "" },
            body,
            if ends_word { r"\b" } else { "" }
        ))
    }
}

/// One correction (or refusal to correct) made while normalizing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub kind: ViolationKind,
    pub detail: String,
    pub count: usize,

    /// False when the text was left as is (a `block` phrase)
    pub applied: bool,
}

/// Normalized text plus the corrections that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized {
    pub text: String,
    pub fixes: Vec<Fix>,
}

#[derive(Debug, Clone)]
struct CompiledPhrase {
    phrase: BannedPhrase,
    regex: Regex,
}

/// Compiled normalization rules
#[derive(Debug, Clone)]
pub struct Normalizer {
    phrases: Vec<CompiledPhrase>,
    punctuation: Regex,
    caps: Regex,
    acronyms: Vec<String>,
}

impl Normalizer {
    pub fn new(settings: &QualitySettings) -> Result<Self, regex::Error> {
        let phrases = settings
            .banned_phrases
            .iter()
            .filter(|p| !p.phrase.trim().is_empty())
            .map(|p| {
                Ok(CompiledPhrase {
                    regex: p.pattern()?,
                    phrase: p.clone(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let punctuation = Regex::new(&format!(
            "[!?]{{{},}}",
            settings.max_repeated_punctuation.max(1) + 1
        ))?;
        let caps = Regex::new(&format!(r"\b\p{{Lu}}{{{},}}\b", settings.caps_min_len.max(2)))?;

        Ok(Self {
            phrases,
            punctuation,
            caps,
            acronyms: settings.acronyms.iter().map(|a| a.to_uppercase()).collect(),
        })
    }

    /// True when some replacement text would itself match a banned phrase
    pub(crate) fn replacement_conflict(&self) -> Option<String> {
        self.phrases.iter().find_map(|p| {
            let replacement = p.phrase.replacement.as_deref()?;
            self.phrases
                .iter()
                .find(|other| other.regex.is_match(replacement))
                .map(|other| format!("replacement '{replacement}' contains '{}'", other.phrase.phrase))
        })
    }

    pub fn normalize(&self, text: &str) -> Normalized {
        let mut fixes = Vec::new();

        let mut current = self.apply_phrases(text, &mut fixes);
        current = SPACE_BEFORE_PUNCT_REGEX.replace_all(&current, "$1").into_owned();
        current = tidy_lines(&current);

        let runs = self.punctuation.find_iter(&current).count();
        if runs > 0 {
            current = self
                .punctuation
                .replace_all(&current, |caps: &Captures| {
                    caps[0].chars().next().map(String::from).unwrap_or_default()
                })
                .into_owned();
            fixes.push(Fix {
                kind: ViolationKind::PunctuationAbuse,
                detail: format!("collapsed {runs} repeated punctuation run(s)"),
                count: runs,
                applied: true,
            });
        }

        let mut recased = 0usize;
        current = self
            .caps
            .replace_all(&current, |caps: &Captures| {
                let word = &caps[0];
                if self.acronyms.iter().any(|a| a == word) {
                    word.to_string()
                } else {
                    recased += 1;
                    capitalize(word)
                }
            })
            .into_owned();
        if recased > 0 {
            fixes.push(Fix {
                kind: ViolationKind::CapsAbuse,
                detail: format!("re-cased {recased} all-caps word(s)"),
                count: recased,
                applied: true,
            });
        }

        Normalized {
            text: tidy_lines(&current),
            fixes,
        }
    }

    fn apply_phrases(&self, text: &str, fixes: &mut Vec<Fix>) -> String {
        let mut counts = vec![0usize; self.phrases.len()];
        let mut current = text.to_string();

        for _ in 0..MAX_PHRASE_PASSES {
            let mut changed = false;
            for (i, compiled) in self.phrases.iter().enumerate() {
                let hits = compiled.regex.find_iter(&current).count();
                if hits == 0 {
                    continue;
                }
                match compiled.phrase.policy {
                    // Counted once; the text does not change
                    FixPolicy::Block => counts[i] = counts[i].max(hits),
                    FixPolicy::Strip => {
                        counts[i] += hits;
                        current = compiled.regex.replace_all(&current, "").into_owned();
                        changed = true;
                    }
                    FixPolicy::Replace => {
                        counts[i] += hits;
                        let replacement = compiled.phrase.replacement.as_deref().unwrap_or("");
                        current = compiled
                            .regex
                            .replace_all(&current, regex::NoExpand(replacement))
                            .into_owned();
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        for (compiled, count) in self.phrases.iter().zip(counts) {
            if count == 0 {
                continue;
            }
            let phrase = &compiled.phrase;
            let detail = match phrase.policy {
                FixPolicy::Strip => format!("removed '{}'", phrase.phrase),
                FixPolicy::Replace => format!(
                    "replaced '{}' with '{}'",
                    phrase.phrase,
                    phrase.replacement.as_deref().unwrap_or("")
                ),
                FixPolicy::Block => format!("contains '{}'", phrase.phrase),
            };
            fixes.push(Fix {
                kind: ViolationKind::BannedPhrase,
                detail,
                count,
                applied: phrase.policy != FixPolicy::Block,
            });
        }

        current
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
