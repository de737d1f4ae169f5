//! Error types shared across gradewise.
//!
//! Storage errors live here rather than in `gradewise-store` so the registry
//! and monitor can surface collaborator failures without depending on any
//! particular backend.

use thiserror::Error;

/// Errors returned by a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested key does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

/// Errors from grading rule registry operations.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule failed validation; each entry is a human-readable problem.
    #[error("invalid rule: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// No rule is registered for the question type.
    #[error("no grading rule for question type: {0}")]
    NotFound(String),

    /// The persistence collaborator failed; in-memory state is unchanged.
    #[error("rule store error: {0}")]
    Store(#[from] StoreError),

    /// Reading or writing an import/export file failed.
    #[error("rule file error: {0}")]
    Io(#[from] std::io::Error),

    /// An import/export file could not be parsed or serialized.
    #[error("rule file format error: {0}")]
    Format(String),
}

impl RuleError {
    /// Validation problems, if this is an `Invalid` error.
    pub fn validation_errors(&self) -> Option<&[String]> {
        match self {
            RuleError::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

/// A failure while grading a single question.
///
/// These never escape `grade_exam`; they become zero-score results tagged
/// with the `error` method.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("invalid max score {score} for question {question_id}")]
    InvalidMaxScore { question_id: String, score: f64 },

    #[error("invalid answer for question {question_id}: {reason}")]
    InvalidAnswer { question_id: String, reason: String },

    #[error("strategy failure: {0}")]
    Strategy(String),
}

/// Errors from quality monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no records")]
    NoRecords,

    #[error("no records for grader {0}")]
    NoRecordsForGrader(String),

    /// The record log collaborator failed; the record was not appended.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}

impl MonitorError {
    /// The error as a JSON result object, e.g. `{"error": "no records"}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

/// A tokenizer backend failed to segment text.
#[derive(Debug, Error)]
#[error("tokenizer {backend} failed: {message}")]
pub struct TokenizeError {
    pub backend: String,
    pub message: String,
}
