//! Per-question-type grading strategies.
//!
//! Each strategy grades one question from `(student, reference, max_score,
//! rule)`. The engine picks a strategy from its dispatch table by question
//! type; new types are added by registering another strategy.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::GradingError;
use crate::keywords::KeywordExtractor;
use crate::model::{Answer, GradingMethod, GradingResult, GradingRule, QuestionInput};
use crate::normalize::normalize_for_rule;
use crate::similarity::similarity;

/// Grades a single question.
pub trait GradingStrategy: Send + Sync {
    /// Strategy name used in logs.
    fn name(&self) -> &str;

    /// Rule key to use when the registry has no rule for the question's own
    /// type.
    fn fallback_rule(&self) -> &str {
        "essay"
    }

    fn grade(&self, question: &QuestionInput<'_>, rule: &GradingRule) -> Result<GradingResult, GradingError>;
}

// ---------------------------------------------------------------------------
// Exact match (single choice, true/false)
// ---------------------------------------------------------------------------

/// All-or-nothing comparison of normalized answers.
///
/// Never awards partial credit, whatever the rule flags say.
#[derive(Debug, Clone)]
pub struct ExactMatchStrategy {
    boolean: bool,
    fallback_rule: String,
}

impl ExactMatchStrategy {
    /// Exact match for option answers such as single choice.
    pub fn choice() -> Self {
        Self {
            boolean: false,
            fallback_rule: "single_choice".to_string(),
        }
    }

    /// Exact match that also folds true/false synonyms (`T`, `yes`, `对`, ...).
    pub fn boolean() -> Self {
        Self {
            boolean: true,
            fallback_rule: "single_choice".to_string(),
        }
    }

    fn canonical(&self, answer: &Answer, rule: &GradingRule) -> String {
        let normalized = normalize_for_rule(&answer.as_text(), rule);
        if !self.boolean {
            return normalized;
        }
        match normalized.to_lowercase().as_str() {
            "t" | "true" | "yes" | "y" | "1" | "对" | "正确" | "是" | "√" => "true".to_string(),
            "f" | "false" | "no" | "n" | "0" | "错" | "错误" | "否" | "×" => "false".to_string(),
            _ => normalized,
        }
    }
}

impl GradingStrategy for ExactMatchStrategy {
    fn name(&self) -> &str {
        if self.boolean {
            "exact-boolean"
        } else {
            "exact"
        }
    }

    fn fallback_rule(&self) -> &str {
        &self.fallback_rule
    }

    fn grade(&self, q: &QuestionInput<'_>, rule: &GradingRule) -> Result<GradingResult, GradingError> {
        let expected = self.canonical(q.reference, rule);
        if expected.is_empty() {
            return Err(GradingError::InvalidAnswer {
                question_id: q.question_id.to_string(),
                reason: "reference answer is empty".into(),
            });
        }

        let given = self.canonical(q.student, rule);
        if given == expected {
            Ok(q.result(q.max_score, GradingMethod::ExactMatch, 1.0, "Correct."))
        } else {
            let feedback = if given.is_empty() {
                format!("No answer given. The correct answer is {}.", q.reference)
            } else {
                format!("Incorrect. The correct answer is {}.", q.reference)
            };
            Ok(q.result(0.0, GradingMethod::NoMatch, 1.0, feedback))
        }
    }
}

// ---------------------------------------------------------------------------
// Set comparison (multiple choice)
// ---------------------------------------------------------------------------

const OPTION_DELIMITERS: &[char] = &[
    ',', ';', '|', '/', '.', ' ', '\t', '，', '；', '、', '。',
];

/// Parse an answer into a set of uppercase option tokens.
///
/// Strings and list items are split on delimiters and stripped of anything
/// but letters and digits, so `"A. C."`, `"a;c"` and `["A", "C"]` agree. A run
/// of distinct option labels (`A`-`J`) such as `"AC"` is read as one option
/// per letter; any other word is kept whole.
pub fn option_set(answer: &Answer) -> BTreeSet<String> {
    let mut options = BTreeSet::new();
    match answer {
        Answer::Choices(items) => {
            for item in items {
                push_options(item, &mut options);
            }
        }
        Answer::Text(text) => push_options(text, &mut options),
    }
    options
}

fn push_options(raw: &str, options: &mut BTreeSet<String>) {
    for piece in raw.split(OPTION_DELIMITERS) {
        let token: String = piece
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_uppercase)
            .collect();
        if token.is_empty() {
            continue;
        }
        if is_label_run(&token) {
            options.extend(token.chars().map(String::from));
        } else {
            options.insert(token);
        }
    }
}

fn is_label_run(token: &str) -> bool {
    let mut seen = BTreeSet::new();
    token.chars().count() > 1 && token.chars().all(|c| ('A'..='J').contains(&c) && seen.insert(c))
}

fn join_options(options: &BTreeSet<String>) -> String {
    options.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Compares option sets with proportional partial credit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceSetStrategy;

impl GradingStrategy for ChoiceSetStrategy {
    fn name(&self) -> &str {
        "choice-set"
    }

    fn fallback_rule(&self) -> &str {
        "multiple_choice"
    }

    fn grade(&self, q: &QuestionInput<'_>, rule: &GradingRule) -> Result<GradingResult, GradingError> {
        let correct = option_set(q.reference);
        if correct.is_empty() {
            return Err(GradingError::InvalidAnswer {
                question_id: q.question_id.to_string(),
                reason: "reference answer has no options".into(),
            });
        }
        let given = option_set(q.student);

        if given == correct {
            return Ok(q.result(q.max_score, GradingMethod::ExactMatch, 1.0, "Correct."));
        }

        let hits = given.intersection(&correct).count();
        if hits == 0 {
            return Ok(q.result(
                0.0,
                GradingMethod::NoMatch,
                1.0,
                format!("Incorrect. The correct options are {}.", join_options(&correct)),
            ));
        }

        if !rule.partial_credit {
            return Ok(q.result(
                0.0,
                GradingMethod::NoMatch,
                1.0,
                format!(
                    "Incorrect; partial credit is disabled. The correct options are {}.",
                    join_options(&correct)
                ),
            ));
        }

        let fraction = hits as f64 / correct.len() as f64;
        Ok(q.result(
            q.max_score * fraction * rule.partial_match_score,
            GradingMethod::PartialMatch,
            0.8,
            format!(
                "Partially correct: {hits} of {} correct options selected. The correct options are {}.",
                correct.len(),
                join_options(&correct)
            ),
        ))
    }
}

// ---------------------------------------------------------------------------
// Similarity + keyword blend (fill blank, short answer, essay)
// ---------------------------------------------------------------------------

/// Tiered text grading: exact match, then similarity, then keyword coverage.
#[derive(Debug, Clone)]
pub struct TextBlendStrategy {
    extractor: Arc<KeywordExtractor>,
    top_k: usize,
}

impl TextBlendStrategy {
    pub fn new(extractor: Arc<KeywordExtractor>, top_k: usize) -> Self {
        Self { extractor, top_k }
    }
}

impl GradingStrategy for TextBlendStrategy {
    fn name(&self) -> &str {
        "text-blend"
    }

    fn grade(&self, q: &QuestionInput<'_>, rule: &GradingRule) -> Result<GradingResult, GradingError> {
        let reference = normalize_for_rule(&q.reference.as_text(), rule);
        if reference.is_empty() {
            return Err(GradingError::InvalidAnswer {
                question_id: q.question_id.to_string(),
                reason: "reference answer is empty".into(),
            });
        }
        let student = normalize_for_rule(&q.student.as_text(), rule);

        if student == reference {
            return Ok(q.result(q.max_score, GradingMethod::ExactMatch, 1.0, "Correct."));
        }

        let sim = similarity(&student, &reference);
        if rule.partial_credit && sim >= rule.similarity_threshold {
            return Ok(q
                .result(
                    q.max_score * rule.partial_match_score,
                    GradingMethod::SimilarityMatch,
                    sim,
                    format!("Close to the reference answer ({:.0}% similar).", sim * 100.0),
                )
                .with_similarity(sim));
        }

        let keywords = self.extractor.extract(&reference, self.top_k);
        let matched = self.extractor.match_keywords(&student, &keywords);
        if rule.partial_credit && matched.ratio > 0.0 {
            let feedback = format!(
                "Matched keywords: {} ({} of {}).",
                matched.matched.join(", "),
                matched.matched.len(),
                keywords.len()
            );
            return Ok(q
                .result(
                    q.max_score * matched.ratio * rule.keyword_weight,
                    GradingMethod::KeywordMatch,
                    matched.ratio,
                    feedback,
                )
                .with_keywords(matched.matched)
                .with_similarity(sim));
        }

        let feedback = if student.is_empty() {
            "No answer given.".to_string()
        } else {
            "Answer does not match the reference.".to_string()
        };
        Ok(q.result(0.0, GradingMethod::NoMatch, 1.0, feedback)
            .with_similarity(sim))
    }
}
