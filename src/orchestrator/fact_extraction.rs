//! Rule-driven extraction of user facts from free text.
//!
//! Each rule is a data record: a pattern, the number of groups it captures
//! and a key template. Rules are evaluated in order and every rule that
//! matches contributes a fact. With one group the key is the template
//! itself; with two groups `{1}` in the template is replaced by the first
//! capture and the value is the second.

use once_cell::sync::Lazy;
use regex::Regex;

/// Captures stop at clause punctuation so one sentence can carry several facts.
/// A period only ends a clause when followed by whitespace, punctuation or
/// the end of input, so `sam@example.com` and `3.30` stay whole.
const CLAUSE: &str = r"((?:[^,.;!?\n]|\.[^\s.,;!?])+)";

static DEFAULT_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    [
        (r"\bmy name is {}", 1, "name"),
        (r"\bi am {}", 1, "identity"),
        (r"\bi live in {}", 1, "location"),
        (r"\bi work (?:at|for|in) {}", 1, "workplace"),
        (r"\bi prefer {}", 1, "preference"),
        (r"\bi like {}", 1, "likes"),
        (r"\bi'm {}", 1, "identity"),
        (r"\bremember that {}", 1, "remembered_fact"),
        (
            r"\bmy (?:favorite|favourite) ((?:[^,.;!?\n]|\.[^\s.,;!?])+?) is {}",
            2,
            "favorite {1}",
        ),
    ]
    .into_iter()
    .map(|(pattern, groups, key)| {
        ExtractionRule::new(&pattern.replace("{}", CLAUSE), groups, key)
            .expect("built-in extraction rule")
    })
    .collect()
});

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Pattern declares {expected} groups but captures {found}")]
    GroupCount { expected: usize, found: usize },
}

#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pattern: Regex,
    group_count: usize,
    key_template: String,
}

impl ExtractionRule {
    pub fn new(pattern: &str, group_count: usize, key_template: &str) -> Result<Self, RuleError> {
        let pattern = Regex::new(pattern)?;
        let found = pattern.captures_len() - 1;
        if found != group_count || !(1..=2).contains(&group_count) {
            return Err(RuleError::GroupCount {
                expected: group_count,
                found,
            });
        }

        Ok(Self {
            pattern,
            group_count,
            key_template: key_template.to_string(),
        })
    }

    fn apply(&self, text: &str) -> Option<ExtractedFact> {
        let captures = self.pattern.captures(text)?;

        let (key, raw_value) = if self.group_count == 2 {
            let subject = captures.get(1)?.as_str().trim();
            (
                self.key_template.replace("{1}", subject),
                captures.get(2)?.as_str(),
            )
        } else {
            (self.key_template.clone(), captures.get(1)?.as_str())
        };

        let value = clean_value(raw_value);
        if value.is_empty() {
            return None;
        }

        Some(ExtractedFact { key, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct FactExtractor {
    rules: Vec<ExtractionRule>,
}

impl FactExtractor {
    pub fn new(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    /// Lower-cases and trims `text`, then applies every rule in order.
    /// Stored values therefore come out lower-cased.
    pub fn extract(&self, text: &str) -> Vec<ExtractedFact> {
        let normalized = text.trim().to_lowercase();
        self.rules
            .iter()
            .filter_map(|rule| rule.apply(&normalized))
            .collect()
    }
}

impl Default for FactExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.clone())
    }
}

fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix('.').unwrap_or(trimmed).trim().to_string()
}
