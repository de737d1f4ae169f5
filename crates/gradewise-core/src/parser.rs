//! Exam reference and answer sheet parser.
//!
//! Loads answer keys and student answer sheets from TOML or JSON files and
//! directories, and validates answer keys.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::engine::GradingEngine;
use crate::model::{Answer, AnswerSheet, ExamReference, QuestionType, ReferenceQuestion};

/// Intermediate structure for parsing answer key files.
#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    exam: ExamHeader,
    questions: QuestionList,
}

#[derive(Debug, Default, Deserialize)]
struct ExamHeader {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
}

/// Questions as an ordered list, or as a table keyed by question id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionList {
    List(Vec<FileQuestion>),
    Keyed(BTreeMap<String, FileQuestion>),
}

#[derive(Debug, Deserialize)]
struct FileQuestion {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", alias = "question_type")]
    question_type: QuestionType,
    #[serde(alias = "correct_answer")]
    answer: Answer,
    #[serde(default = "default_score", alias = "max_score")]
    score: f64,
}

fn default_score() -> f64 {
    1.0
}

/// Answer files hold one sheet, a list of sheets, or `{ sheets = [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswerFile {
    Many(Vec<AnswerSheet>),
    Wrapped { sheets: Vec<AnswerSheet> },
    One(AnswerSheet),
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

fn is_input_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "toml" || ext == "json")
}

fn parse_str<T: DeserializeOwned>(content: &str, source_path: &Path) -> Result<T> {
    if is_toml(source_path) {
        toml::from_str(content)
            .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("failed to parse JSON: {}", source_path.display()))
    }
}

/// Split `q12b` into `("q", 12, "b")` so keyed questions sort naturally.
fn natural_key(id: &str) -> (String, u64, String) {
    let prefix: String = id.chars().take_while(|c| !c.is_ascii_digit()).collect();
    let rest = &id[prefix.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let suffix = rest[digits.len()..].to_string();
    (prefix, digits.parse().unwrap_or(0), suffix)
}

/// Parse a single answer key file.
pub fn parse_reference(path: &Path) -> Result<ExamReference> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer key: {}", path.display()))?;

    parse_reference_str(&content, path)
}

/// Parse answer key text; the format follows `source_path`'s extension
/// (`.toml`, anything else is JSON).
pub fn parse_reference_str(content: &str, source_path: &Path) -> Result<ExamReference> {
    let parsed: ReferenceFile = parse_str(content, source_path)?;

    let questions: Vec<(String, FileQuestion)> = match parsed.questions {
        QuestionList::List(list) => list
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                let id = q.id.clone().unwrap_or_else(|| format!("q{}", i + 1));
                (id, q)
            })
            .collect(),
        QuestionList::Keyed(map) => {
            let mut entries: Vec<(String, FileQuestion)> = map.into_iter().collect();
            entries.sort_by_key(|(id, _)| natural_key(id));
            entries
        }
    };

    let exam_id = if parsed.exam.id.is_empty() {
        source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        parsed.exam.id
    };

    Ok(ExamReference {
        exam_id,
        title: parsed.exam.title,
        questions: questions
            .into_iter()
            .map(|(id, q)| ReferenceQuestion {
                id,
                question_type: q.question_type,
                correct_answer: q.answer,
                score: q.score,
            })
            .collect(),
    })
}

/// Parse an answer file holding one or more sheets.
///
/// A single sheet without a `student_id` takes the file stem.
pub fn parse_answer_file(path: &Path) -> Result<Vec<AnswerSheet>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer file: {}", path.display()))?;

    let sheets = match parse_str::<AnswerFile>(&content, path)? {
        AnswerFile::Many(sheets) | AnswerFile::Wrapped { sheets } => sheets,
        AnswerFile::One(mut sheet) => {
            if sheet.student_id.trim().is_empty() {
                sheet.student_id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            vec![sheet]
        }
    };

    if let Some(sheet) = sheets.iter().find(|s| s.student_id.trim().is_empty()) {
        anyhow::bail!(
            "answer sheet without student_id in {} ({} answers)",
            path.display(),
            sheet.answers.len()
        );
    }

    Ok(sheets)
}

/// Recursively load every `.toml`/`.json` answer file under `dir`, in path
/// order. Unparseable files are skipped with a warning.
pub fn load_answer_directory(dir: &Path) -> Result<Vec<AnswerSheet>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        paths.push(entry?.path());
    }
    paths.sort();

    let mut sheets = Vec::new();
    for path in paths {
        if path.is_dir() {
            sheets.extend(load_answer_directory(&path)?);
        } else if is_input_file(&path) {
            match parse_answer_file(&path) {
                Ok(found) => sheets.extend(found),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sheets)
}

/// Load answer sheets from a file or a directory.
pub fn load_answers(path: &Path) -> Result<Vec<AnswerSheet>> {
    if path.is_dir() {
        load_answer_directory(path)
    } else {
        parse_answer_file(path)
    }
}

/// A warning from answer key validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate an answer key for common issues.
pub fn validate_reference(reference: &ExamReference, engine: &GradingEngine) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if reference.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "answer key has no questions".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for q in &reference.questions {
        if !seen_ids.insert(&q.id) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: format!("duplicate question ID: {}", q.id),
            });
        }
    }

    for q in &reference.questions {
        if !(q.score.is_finite() && q.score > 0.0) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: format!("score {} is not a positive number", q.score),
            });
        }
        if q.correct_answer.is_empty() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: "correct answer is empty".into(),
            });
        }
        if !engine.is_known_type(&q.question_type) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: format!(
                    "question type '{}' has no rule or strategy; it will be graded with the essay rule",
                    q.question_type
                ),
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::rules::GradingRuleRegistry;

    const VALID_TOML: &str = r#"
[exam]
id = "bio-101"
title = "Biology midterm"

[[questions]]
id = "q1"
type = "single_choice"
answer = "B"
score = 2

[[questions]]
id = "q2"
type = "multiple_choice"
answer = ["A", "C"]
score = 4

[[questions]]
id = "q3"
type = "short_answer"
answer = "Mitochondria produce ATP through cellular respiration"
score = 6
"#;

    fn engine() -> GradingEngine {
        GradingEngine::new(Arc::new(GradingRuleRegistry::in_memory()), EngineConfig::default())
    }

    #[test]
    fn parse_valid_toml() {
        let reference = parse_reference_str(VALID_TOML, &PathBuf::from("bio.toml")).unwrap();
        assert_eq!(reference.exam_id, "bio-101");
        assert_eq!(reference.questions.len(), 3);
        assert_eq!(reference.questions[1].question_type, QuestionType::MultipleChoice);
        assert_eq!(reference.questions[1].correct_answer, Answer::from(vec!["A", "C"]));
        assert_eq!(reference.total_max_score(), 12.0);
    }

    #[test]
    fn parse_keyed_json_in_natural_order() {
        let json = r#"{
            "questions": {
                "q10": {"type": "essay", "answer": "x", "score": 5},
                "q2": {"question_type": "fill_blank", "correct_answer": "y"},
                "q1": {"type": "judge", "answer": "T"}
            }
        }"#;
        let reference = parse_reference_str(json, &PathBuf::from("quiz-3.json")).unwrap();
        let ids: Vec<&str> = reference.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q10"]);
        assert_eq!(reference.exam_id, "quiz-3");
        assert_eq!(reference.questions[0].question_type, QuestionType::TrueFalse);
        assert_eq!(reference.questions[1].score, 1.0);
    }

    #[test]
    fn list_questions_without_ids_are_numbered() {
        let json = r#"{"questions": [{"type": "essay", "answer": "a"}, {"type": "essay", "answer": "b"}]}"#;
        let reference = parse_reference_str(json, &PathBuf::from("e.json")).unwrap();
        assert_eq!(reference.questions[0].id, "q1");
        assert_eq!(reference.questions[1].id, "q2");
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_reference_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn answer_file_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let one = dir.path().join("alice.toml");
        std::fs::write(&one, "[answers]\nq1 = \"B\"\nq2 = [\"A\", \"C\"]\n").unwrap();
        let sheets = parse_answer_file(&one).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].student_id, "alice");
        assert_eq!(sheets[0].answers.len(), 2);

        let many = dir.path().join("class.json");
        std::fs::write(
            &many,
            r#"[{"student_id": "s1", "answers": {"q1": "A"}}, {"student_id": "s2", "answers": {}}]"#,
        )
        .unwrap();
        assert_eq!(parse_answer_file(&many).unwrap().len(), 2);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"sheets": [{"student_id": "s3", "answers": {"q1": "C"}}]}"#).unwrap();
        assert_eq!(parse_answer_file(&wrapped).unwrap()[0].student_id, "s3");

        let anonymous = dir.path().join("anon.json");
        std::fs::write(&anonymous, r#"[{"student_id": "", "answers": {}}]"#).unwrap();
        assert!(parse_answer_file(&anonymous).is_err());
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"student_id": "bob", "answers": {"q1": "A"}}"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"student_id": "amy", "answers": {"q1": "B"}}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nested = dir.path().join("late");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("c.toml"), "student_id = \"cat\"\n[answers]\nq1 = \"C\"\n").unwrap();

        let sheets = load_answer_directory(dir.path()).unwrap();
        let ids: Vec<&str> = sheets.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["amy", "bob", "cat"]);

        assert!(load_answer_directory(&dir.path().join("a.json")).is_err());
    }

    #[test]
    fn validate_flags_common_issues() {
        let mut reference = parse_reference_str(VALID_TOML, &PathBuf::from("bio.toml")).unwrap();
        assert!(validate_reference(&reference, &engine()).is_empty());

        reference.questions[1].id = "q1".into();
        reference.questions[2].score = 0.0;
        reference.questions[2].correct_answer = Answer::from("  ");
        reference.questions[0].question_type = QuestionType::Custom("diagram".into());

        let warnings = validate_reference(&reference, &engine());
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(warnings.len(), 4, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("duplicate question ID")));
        assert!(messages.iter().any(|m| m.contains("not a positive number")));
        assert!(messages.iter().any(|m| m.contains("correct answer is empty")));
        assert!(messages.iter().any(|m| m.contains("'diagram'")));
    }

    #[test]
    fn validate_empty_reference() {
        let warnings = validate_reference(&ExamReference::default(), &engine());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].question_id, None);
    }
}
