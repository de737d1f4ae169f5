//! Answer text canonicalization.

use crate::model::GradingRule;

/// Flags controlling normalization, usually taken from a [`GradingRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub case_sensitive: bool,
    pub ignore_punctuation: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            ignore_punctuation: true,
        }
    }
}

impl From<&GradingRule> for NormalizeOptions {
    fn from(rule: &GradingRule) -> Self {
        Self {
            case_sensitive: rule.case_sensitive,
            ignore_punctuation: rule.ignore_punctuation,
        }
    }
}

/// Canonicalize answer text.
///
/// Trims, optionally drops everything except letters, digits, underscores and
/// whitespace, optionally lowercases, then collapses whitespace runs to a
/// single space. Never fails.
pub fn normalize(text: &str, options: NormalizeOptions) -> String {
    let trimmed = text.trim();

    let kept: String = if options.ignore_punctuation {
        trimmed
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
            .collect()
    } else {
        trimmed.to_string()
    };

    let cased = if options.case_sensitive {
        kept
    } else {
        kept.to_lowercase()
    };

    cased.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize with the flags of a rule.
pub fn normalize_for_rule(text: &str, rule: &GradingRule) -> String {
    normalize(text, NormalizeOptions::from(rule))
}
