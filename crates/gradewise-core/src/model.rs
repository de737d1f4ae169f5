//! Core data model types for gradewise.
//!
//! Question types, answers, grading rules, per-question results and the
//! exam-level aggregate that the engine produces.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quality::{GraderKind, GradingRecord};

/// The kind of question being graded.
///
/// Any key that is not one of the built-in archetypes is kept verbatim as
/// `Custom`, so rules and strategies can be registered for new types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillBlank,
    ShortAnswer,
    Essay,
    Custom(String),
}

impl QuestionType {
    /// The five question types that ship with a built-in rule.
    pub const BUILT_IN_RULES: [QuestionType; 5] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::FillBlank,
        QuestionType::ShortAnswer,
        QuestionType::Essay,
    ];

    /// Canonical registry key, e.g. `"short_answer"`.
    pub fn key(&self) -> &str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
            QuestionType::Custom(key) => key,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, QuestionType::Custom(_))
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QuestionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.trim().to_lowercase().replace(['-', ' '], "_");
        Ok(match canonical.as_str() {
            "single_choice" | "single" | "choice" => QuestionType::SingleChoice,
            "multiple_choice" | "multi_choice" | "multiple" => QuestionType::MultipleChoice,
            "true_false" | "judge" | "boolean" => QuestionType::TrueFalse,
            "fill_blank" | "fill_in_blank" | "blank" => QuestionType::FillBlank,
            "short_answer" | "short" => QuestionType::ShortAnswer,
            "essay" => QuestionType::Essay,
            _ => QuestionType::Custom(canonical),
        })
    }
}

impl From<String> for QuestionType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(qt) => qt,
            Err(never) => match never {},
        }
    }
}

impl From<QuestionType> for String {
    fn from(qt: QuestionType) -> Self {
        qt.key().to_string()
    }
}

/// A student or reference answer.
///
/// Multiple-choice answers may arrive as a list of option letters; every
/// other answer is plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Choices(Vec<String>),
}

impl Answer {
    /// The answer as a single string; choice lists are joined with commas.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Answer::Text(text) => Cow::Borrowed(text),
            Answer::Choices(choices) => Cow::Owned(choices.join(",")),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Answer::Text(text) => text.trim().is_empty(),
            Answer::Choices(choices) => choices.iter().all(|c| c.trim().is_empty()),
        }
    }
}

impl Default for Answer {
    fn default() -> Self {
        Answer::Text(String::new())
    }
}

impl From<&str> for Answer {
    fn from(s: &str) -> Self {
        Answer::Text(s.to_string())
    }
}

impl From<String> for Answer {
    fn from(s: String) -> Self {
        Answer::Text(s)
    }
}

impl From<Vec<&str>> for Answer {
    fn from(choices: Vec<&str>) -> Self {
        Answer::Choices(choices.into_iter().map(String::from).collect())
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// One named tier of a grading rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriterion {
    /// Short name, e.g. "high similarity".
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Fraction of the max score this tier awards, in [0, 1].
    pub score_percentage: f64,
    /// Symbolic condition tags, e.g. `["similarity_match"]`.
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f64>,
}

impl ScoringCriterion {
    pub fn new(name: &str, description: &str, score_percentage: f64, conditions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            score_percentage,
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
            keywords: Vec::new(),
            min_similarity: None,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }
}

/// Configuration describing how one question type is scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRule {
    /// Registry key, e.g. `"fill_blank"`.
    #[serde(default)]
    pub question_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Authoring weight kept with the rule and range-checked by validation.
    /// Grading always awards the full max score for an exact match.
    #[serde(default = "default_exact_match_score")]
    pub exact_match_score: f64,
    /// Fraction awarded for partial matches (similarity tier, choice overlap).
    pub partial_match_score: f64,
    /// Weight applied to the keyword match ratio.
    pub keyword_weight: f64,
    /// Minimum similarity for the similarity tier.
    pub similarity_threshold: f64,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub ignore_punctuation: bool,
    #[serde(default = "default_true")]
    pub partial_credit: bool,
    #[serde(default)]
    pub criteria: Vec<ScoringCriterion>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_exact_match_score() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// How a question's score was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMethod {
    ExactMatch,
    PartialMatch,
    SimilarityMatch,
    KeywordMatch,
    NoMatch,
    /// Unknown question type graded with the fallback rule.
    Default,
    /// The question's strategy failed.
    Error,
}

impl fmt::Display for GradingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GradingMethod::ExactMatch => "exact_match",
            GradingMethod::PartialMatch => "partial_match",
            GradingMethod::SimilarityMatch => "similarity_match",
            GradingMethod::KeywordMatch => "keyword_match",
            GradingMethod::NoMatch => "no_match",
            GradingMethod::Default => "default",
            GradingMethod::Error => "error",
        };
        f.write_str(s)
    }
}

/// The outcome of grading one answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub question_id: String,
    pub question_type: QuestionType,
    pub student_answer: Answer,
    pub reference_answer: Answer,
    pub max_score: f64,
    pub obtained_score: f64,
    /// `obtained_score / max_score`, or 0 when `max_score` is 0.
    pub score_ratio: f64,
    pub method: GradingMethod,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords_matched: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl GradingResult {
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords_matched = Some(keywords);
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn is_full_score(&self) -> bool {
        self.max_score > 0.0 && (self.obtained_score - self.max_score).abs() < 1e-9
    }
}

/// Borrowed inputs for grading a single question.
#[derive(Debug, Clone, Copy)]
pub struct QuestionInput<'a> {
    pub question_id: &'a str,
    pub question_type: &'a QuestionType,
    pub student: &'a Answer,
    pub reference: &'a Answer,
    pub max_score: f64,
}

impl QuestionInput<'_> {
    /// Build a result for this question.
    pub fn result(
        &self,
        obtained_score: f64,
        method: GradingMethod,
        confidence: f64,
        feedback: impl Into<String>,
    ) -> GradingResult {
        let score_ratio = if self.max_score == 0.0 {
            0.0
        } else {
            obtained_score / self.max_score
        };
        GradingResult {
            question_id: self.question_id.to_string(),
            question_type: self.question_type.clone(),
            student_answer: self.student.clone(),
            reference_answer: self.reference.clone(),
            max_score: self.max_score,
            obtained_score,
            score_ratio,
            method,
            confidence: confidence.clamp(0.0, 1.0),
            feedback: feedback.into(),
            keywords_matched: None,
            similarity: None,
        }
    }
}

/// One question of an exam's answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceQuestion {
    pub id: String,
    pub question_type: QuestionType,
    pub correct_answer: Answer,
    /// Max score for this question.
    pub score: f64,
}

/// An exam's answer key, in question order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamReference {
    #[serde(default)]
    pub exam_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<ReferenceQuestion>,
}

impl ExamReference {
    pub fn total_max_score(&self) -> f64 {
        self.questions.iter().map(|q| q.score).sum()
    }
}

/// One student's answers, keyed by question id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerSheet {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub exam_id: Option<String>,
    #[serde(default)]
    pub answers: HashMap<String, Answer>,
}

/// Summary block of an exam result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingSummary {
    pub total_questions: usize,
    /// Questions graded without a strategy error.
    pub graded_questions: usize,
    pub average_confidence: f64,
    pub grading_time: DateTime<Utc>,
}

/// Exam-level aggregate of per-question results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub total_score: f64,
    pub total_max_score: f64,
    /// `total_score / total_max_score * 100`, or 0 when the max is 0.
    pub percentage: f64,
    pub passed: bool,
    pub pass_score: f64,
    pub question_results: Vec<GradingResult>,
    pub grading_summary: GradingSummary,
}

impl ExamResult {
    /// Convert each question result into a grading record so the quality
    /// monitor can audit automated grading next to human graders.
    pub fn to_records(&self, exam_id: &str, student_id: &str, grader_id: &str) -> Vec<GradingRecord> {
        self.question_results
            .iter()
            .map(|r| {
                let mut record = GradingRecord::new(
                    exam_id,
                    &r.question_id,
                    student_id,
                    grader_id,
                    r.obtained_score,
                    r.max_score,
                );
                record.grader_kind = GraderKind::Automated;
                record.confidence = r.confidence;
                record.grading_time = self.grading_summary.grading_time;
                record.comments = format!("{}: {}", r.method, r.feedback);
                record
            })
            .collect()
    }
}

/// An exam result tagged with the student it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentExamResult {
    pub student_id: String,
    pub result: ExamResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_display_and_parse() {
        assert_eq!(QuestionType::ShortAnswer.to_string(), "short_answer");
        assert_eq!("Multiple-Choice".parse::<QuestionType>().unwrap(), QuestionType::MultipleChoice);
        assert_eq!("judge".parse::<QuestionType>().unwrap(), QuestionType::TrueFalse);
        assert_eq!(
            "calculation".parse::<QuestionType>().unwrap(),
            QuestionType::Custom("calculation".into())
        );
    }

    #[test]
    fn question_type_serializes_as_key() {
        let json = serde_json::to_string(&QuestionType::FillBlank).unwrap();
        assert_eq!(json, "\"fill_blank\"");
        let qt: QuestionType = serde_json::from_str("\"essay\"").unwrap();
        assert_eq!(qt, QuestionType::Essay);
    }

    #[test]
    fn answer_accepts_text_or_list() {
        let text: Answer = serde_json::from_str("\"B\"").unwrap();
        assert_eq!(text, Answer::Text("B".into()));
        let list: Answer = serde_json::from_str("[\"A\", \"C\"]").unwrap();
        assert_eq!(list.as_text(), "A,C");
        assert!(Answer::default().is_empty());
    }

    #[test]
    fn score_ratio_is_zero_for_zero_max() {
        let qt = QuestionType::Essay;
        let student = Answer::from("x");
        let reference = Answer::from("y");
        let input = QuestionInput {
            question_id: "q1",
            question_type: &qt,
            student: &student,
            reference: &reference,
            max_score: 0.0,
        };
        let result = input.result(0.0, GradingMethod::NoMatch, 1.0, "");
        assert_eq!(result.score_ratio, 0.0);
    }

    #[test]
    fn rule_defaults_fill_in_optional_fields() {
        let json = r#"{
            "question_type": "fill_blank",
            "name": "Fill blank",
            "partial_match_score": 0.8,
            "keyword_weight": 0.6,
            "similarity_threshold": 0.85
        }"#;
        let rule: GradingRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.exact_match_score, 1.0);
        assert!(rule.ignore_punctuation);
        assert!(rule.partial_credit);
        assert!(!rule.case_sensitive);
        assert_eq!(rule.version, 1);
    }
}
