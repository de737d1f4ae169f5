//! The grading engine.
//!
//! Resolves a rule and a strategy per question, grades it, and aggregates
//! question results into an exam result. The engine performs no I/O and owns
//! no mutable state; it is safe to share across threads.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::error::GradingError;
use crate::keywords::KeywordExtractor;
use crate::model::{
    Answer, AnswerSheet, ExamReference, ExamResult, GradingMethod, GradingResult, GradingSummary,
    QuestionInput, QuestionType, StudentExamResult,
};
use crate::rules::{builtin_rule, GradingRuleRegistry};
use crate::strategy::{ChoiceSetStrategy, ExactMatchStrategy, GradingStrategy, TextBlendStrategy};

/// Rule key used for question types with neither a strategy nor a rule.
pub const FALLBACK_RULE: &str = "essay";

/// Confidence reported for questions graded under the fallback rule.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Grades questions and exams against the rules in a registry.
pub struct GradingEngine {
    registry: Arc<GradingRuleRegistry>,
    strategies: HashMap<String, Arc<dyn GradingStrategy>>,
    fallback: Arc<dyn GradingStrategy>,
    config: EngineConfig,
}

impl std::fmt::Debug for GradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.strategies.keys().collect();
        types.sort();
        f.debug_struct("GradingEngine")
            .field("strategies", &types)
            .field("fallback", &self.fallback.name())
            .field("config", &self.config)
            .finish()
    }
}

impl GradingEngine {
    /// An engine with the built-in strategies and the default keyword extractor.
    pub fn new(registry: Arc<GradingRuleRegistry>, config: EngineConfig) -> Self {
        Self::with_extractor(registry, KeywordExtractor::default(), config)
    }

    /// An engine whose text strategy uses `extractor`, e.g. one with a
    /// different tokenizer or an exam-wide IDF corpus.
    pub fn with_extractor(
        registry: Arc<GradingRuleRegistry>,
        extractor: KeywordExtractor,
        config: EngineConfig,
    ) -> Self {
        let blend: Arc<dyn GradingStrategy> =
            Arc::new(TextBlendStrategy::new(Arc::new(extractor), config.keyword_top_k));
        let exact: Arc<dyn GradingStrategy> = Arc::new(ExactMatchStrategy::choice());

        let mut strategies: HashMap<String, Arc<dyn GradingStrategy>> = HashMap::new();
        strategies.insert(QuestionType::SingleChoice.key().to_string(), exact);
        strategies.insert(
            QuestionType::TrueFalse.key().to_string(),
            Arc::new(ExactMatchStrategy::boolean()),
        );
        strategies.insert(
            QuestionType::MultipleChoice.key().to_string(),
            Arc::new(ChoiceSetStrategy),
        );
        for qt in [QuestionType::FillBlank, QuestionType::ShortAnswer, QuestionType::Essay] {
            strategies.insert(qt.key().to_string(), Arc::clone(&blend));
        }

        Self {
            registry,
            strategies,
            fallback: blend,
            config,
        }
    }

    /// Add or replace the strategy for a question type.
    pub fn register_strategy(&mut self, question_type: &QuestionType, strategy: Arc<dyn GradingStrategy>) {
        tracing::debug!(
            "registering strategy '{}' for {}",
            strategy.name(),
            question_type
        );
        self.strategies
            .insert(question_type.key().to_string(), strategy);
    }

    pub fn registry(&self) -> &Arc<GradingRuleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Question types with a dedicated strategy, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.strategies.keys().cloned().collect();
        types.sort();
        types
    }

    /// Whether `question_type` has a strategy or a rule of its own.
    pub fn is_known_type(&self, question_type: &QuestionType) -> bool {
        let key = question_type.key();
        self.strategies.contains_key(key) || self.registry.contains(key)
    }

    /// Grade one answer.
    ///
    /// Types with a strategy use their own rule, else the strategy's fallback
    /// rule. Types with a rule but no strategy use the text strategy. Types
    /// with neither are graded under the essay rule and reported with the
    /// `default` method.
    pub fn grade_question(
        &self,
        question_id: &str,
        question_type: &QuestionType,
        student: &Answer,
        reference: &Answer,
        max_score: f64,
    ) -> Result<GradingResult, GradingError> {
        if !max_score.is_finite() || max_score < 0.0 {
            return Err(GradingError::InvalidMaxScore {
                question_id: question_id.to_string(),
                score: max_score,
            });
        }

        let input = QuestionInput {
            question_id,
            question_type,
            student,
            reference,
            max_score,
        };
        let key = question_type.key();

        if let Some(strategy) = self.strategies.get(key) {
            let rule = self
                .registry
                .get_rule(key)
                .or_else(|| self.registry.get_rule(strategy.fallback_rule()))
                .or_else(|| builtin_rule(strategy.fallback_rule()))
                .ok_or_else(|| GradingError::Strategy(format!("no rule for question type '{key}'")))?;
            tracing::debug!("grading {question_id} as {key} with {}", strategy.name());
            return strategy.grade(&input, &rule);
        }

        if let Some(rule) = self.registry.get_rule(key) {
            tracing::debug!("grading {question_id} as {key} with {}", self.fallback.name());
            return self.fallback.grade(&input, &rule);
        }

        tracing::warn!("unknown question type '{key}' for {question_id}, using the {FALLBACK_RULE} rule");
        let rule = self
            .registry
            .get_rule(FALLBACK_RULE)
            .or_else(|| builtin_rule(FALLBACK_RULE))
            .ok_or_else(|| GradingError::Strategy(format!("no {FALLBACK_RULE} rule")))?;
        let mut result = self.fallback.grade(&input, &rule)?;
        result.method = GradingMethod::Default;
        result.confidence = FALLBACK_CONFIDENCE;
        result.feedback = format!("Unknown question type '{key}'. {}", result.feedback);
        Ok(result)
    }

    /// Grade every question of `reference` and aggregate the results.
    ///
    /// Never fails: a question whose grading errors (or panics) scores zero
    /// with the `error` method, and unanswered questions are graded as empty
    /// answers.
    pub fn grade_exam(&self, answers: &HashMap<String, Answer>, reference: &ExamReference) -> ExamResult {
        let empty = Answer::default();
        let question_results: Vec<GradingResult> = reference
            .questions
            .iter()
            .map(|q| {
                let student = answers.get(&q.id).unwrap_or(&empty);
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    self.grade_question(&q.id, &q.question_type, student, &q.correct_answer, q.score)
                }));
                let error = match outcome {
                    Ok(Ok(result)) => return result,
                    Ok(Err(e)) => e.to_string(),
                    Err(panic) => format!("strategy panicked: {}", panic_message(&*panic)),
                };
                tracing::warn!("grading failed for question {}: {error}", q.id);
                let max_score = if q.score.is_finite() && q.score >= 0.0 { q.score } else { 0.0 };
                QuestionInput {
                    question_id: &q.id,
                    question_type: &q.question_type,
                    student,
                    reference: &q.correct_answer,
                    max_score,
                }
                .result(0.0, GradingMethod::Error, 0.0, format!("Grading error: {error}"))
            })
            .collect();

        self.aggregate(question_results)
    }

    /// Grade one answer sheet.
    pub fn grade_sheet(&self, sheet: &AnswerSheet, reference: &ExamReference) -> StudentExamResult {
        if let Some(exam_id) = &sheet.exam_id {
            if !reference.exam_id.is_empty() && exam_id != &reference.exam_id {
                tracing::warn!(
                    "answer sheet of {} is for exam '{exam_id}', grading against '{}'",
                    sheet.student_id,
                    reference.exam_id
                );
            }
        }
        StudentExamResult {
            student_id: sheet.student_id.clone(),
            result: self.grade_exam(&sheet.answers, reference),
        }
    }

    fn aggregate(&self, question_results: Vec<GradingResult>) -> ExamResult {
        let total_score: f64 = question_results.iter().map(|r| r.obtained_score).sum();
        let total_max_score: f64 = question_results.iter().map(|r| r.max_score).sum();
        let percentage = if total_max_score > 0.0 {
            total_score / total_max_score * 100.0
        } else {
            0.0
        };
        let pass_score = total_max_score * self.config.pass_ratio;
        let graded_questions = question_results
            .iter()
            .filter(|r| r.method != GradingMethod::Error)
            .count();
        let average_confidence = if question_results.is_empty() {
            0.0
        } else {
            question_results.iter().map(|r| r.confidence).sum::<f64>() / question_results.len() as f64
        };

        ExamResult {
            total_score,
            total_max_score,
            percentage,
            passed: total_score >= pass_score,
            pass_score,
            grading_summary: GradingSummary {
                total_questions: question_results.len(),
                graded_questions,
                average_confidence,
                grading_time: Utc::now(),
            },
            question_results,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GradingRule, ReferenceQuestion};
    use crate::rules::RuleUpdate;

    fn engine() -> GradingEngine {
        GradingEngine::new(Arc::new(GradingRuleRegistry::in_memory()), EngineConfig::default())
    }

    fn question(id: &str, qt: QuestionType, answer: Answer, score: f64) -> ReferenceQuestion {
        ReferenceQuestion {
            id: id.into(),
            question_type: qt,
            correct_answer: answer,
            score,
        }
    }

    fn sample_exam() -> ExamReference {
        ExamReference {
            exam_id: "bio-101".into(),
            title: "Biology".into(),
            questions: vec![
                question("q1", QuestionType::SingleChoice, "B".into(), 2.0),
                question("q2", QuestionType::MultipleChoice, vec!["A", "C"].into(), 4.0),
                question("q3", QuestionType::FillBlank, "photosynthesis".into(), 4.0),
            ],
        }
    }

    struct PanickingStrategy;

    impl GradingStrategy for PanickingStrategy {
        fn name(&self) -> &str {
            "panics"
        }

        fn grade(&self, _: &QuestionInput<'_>, _: &GradingRule) -> Result<GradingResult, GradingError> {
            panic!("boom")
        }
    }

    struct HalfCreditStrategy;

    impl GradingStrategy for HalfCreditStrategy {
        fn name(&self) -> &str {
            "half"
        }

        fn grade(&self, q: &QuestionInput<'_>, _: &GradingRule) -> Result<GradingResult, GradingError> {
            Ok(q.result(q.max_score / 2.0, GradingMethod::PartialMatch, 0.9, "half"))
        }
    }

    #[test]
    fn grades_full_exam() {
        let answers: HashMap<String, Answer> = [
            ("q1".to_string(), Answer::from("B")),
            ("q2".to_string(), Answer::from(vec!["A"])),
            ("q3".to_string(), Answer::from("Photosynthesis")),
        ]
        .into_iter()
        .collect();

        let result = engine().grade_exam(&answers, &sample_exam());
        assert_eq!(result.question_results.len(), 3);
        assert_eq!(result.question_results[0].obtained_score, 2.0);
        // half the options, multiple_choice partial score 0.5
        assert!((result.question_results[1].obtained_score - 1.0).abs() < 1e-9);
        assert_eq!(result.question_results[2].obtained_score, 4.0);
        assert!((result.total_score - 7.0).abs() < 1e-9);
        assert_eq!(result.total_max_score, 10.0);
        assert!((result.percentage - 70.0).abs() < 1e-9);
        assert!((result.pass_score - 6.0).abs() < 1e-9);
        assert!(result.passed);
        assert_eq!(result.grading_summary.graded_questions, 3);
    }

    #[test]
    fn all_correct_exam_scores_full_marks() {
        let exam = ExamReference {
            exam_id: "chem-1".into(),
            title: "Chemistry".into(),
            questions: vec![
                question("q1", QuestionType::SingleChoice, "C".into(), 10.0),
                question("q2", QuestionType::FillBlank, "oxidation".into(), 10.0),
            ],
        };
        let answers: HashMap<String, Answer> = [
            ("q1".to_string(), Answer::from("c")),
            ("q2".to_string(), Answer::from("Oxidation")),
        ]
        .into_iter()
        .collect();

        let result = engine().grade_exam(&answers, &exam);
        assert_eq!(result.total_score, 20.0);
        assert_eq!(result.total_max_score, 20.0);
        assert_eq!(result.percentage, 100.0);
        assert!(result.passed);
        assert_eq!(result.grading_summary.average_confidence, 1.0);
    }

    #[test]
    fn missing_answers_score_zero() {
        let result = engine().grade_exam(&HashMap::new(), &sample_exam());
        assert_eq!(result.total_score, 0.0);
        assert!(!result.passed);
        assert_eq!(result.grading_summary.total_questions, 3);
        assert_eq!(result.grading_summary.graded_questions, 3);
    }

    #[test]
    fn totals_bound_obtained_scores() {
        let answers: HashMap<String, Answer> =
            [("q3".to_string(), Answer::from("photosynthesys"))].into_iter().collect();
        let result = engine().grade_exam(&answers, &sample_exam());
        for r in &result.question_results {
            assert!(r.obtained_score >= 0.0 && r.obtained_score <= r.max_score);
            assert!((0.0..=1.0).contains(&r.confidence));
        }
        assert!(result.total_score <= result.total_max_score);
    }

    #[test]
    fn unknown_type_falls_back_to_essay_rule() {
        let r = engine()
            .grade_question(
                "q9",
                &QuestionType::Custom("diagram".into()),
                &"mitochondria".into(),
                &"mitochondria".into(),
                5.0,
            )
            .unwrap();
        assert_eq!(r.method, GradingMethod::Default);
        assert_eq!(r.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(r.obtained_score, 5.0);
        assert!(r.feedback.starts_with("Unknown question type 'diagram'"));
    }

    #[test]
    fn custom_rule_without_strategy_uses_text_strategy() {
        let registry = Arc::new(GradingRuleRegistry::in_memory());
        let mut rule = builtin_rule("short_answer").unwrap();
        rule.question_type = "definition".into();
        rule.name = "Definition".into();
        registry.create_rule(rule).unwrap();

        let engine = GradingEngine::new(registry, EngineConfig::default());
        let r = engine
            .grade_question(
                "q1",
                &QuestionType::Custom("definition".into()),
                &"osmosis".into(),
                &"osmosis".into(),
                3.0,
            )
            .unwrap();
        assert_eq!(r.method, GradingMethod::ExactMatch);
        assert_eq!(r.obtained_score, 3.0);
    }

    #[test]
    fn true_false_uses_single_choice_rule() {
        let r = engine()
            .grade_question("q1", &QuestionType::TrueFalse, &"yes".into(), &"T".into(), 1.0)
            .unwrap();
        assert_eq!(r.method, GradingMethod::ExactMatch);
        assert_eq!(r.obtained_score, 1.0);
    }

    #[test]
    fn invalid_max_score_becomes_error_result() {
        let mut exam = sample_exam();
        exam.questions[0].score = -1.0;
        exam.questions[1].score = f64::NAN;
        let result = engine().grade_exam(&HashMap::new(), &exam);
        assert_eq!(result.question_results[0].method, GradingMethod::Error);
        assert_eq!(result.question_results[0].max_score, 0.0);
        assert_eq!(result.question_results[1].method, GradingMethod::Error);
        assert_eq!(result.grading_summary.graded_questions, 1);
        assert_eq!(result.total_max_score, 4.0);
    }

    #[test]
    fn panicking_strategy_is_contained() {
        let mut engine = engine();
        engine.register_strategy(&QuestionType::SingleChoice, Arc::new(PanickingStrategy));
        let answers: HashMap<String, Answer> = [("q3".to_string(), "photosynthesis".into())].into_iter().collect();
        let result = engine.grade_exam(&answers, &sample_exam());
        let q1 = &result.question_results[0];
        assert_eq!(q1.method, GradingMethod::Error);
        assert_eq!(q1.obtained_score, 0.0);
        assert!(q1.feedback.contains("boom"));
        assert_eq!(result.question_results[2].obtained_score, 4.0);
    }

    #[test]
    fn registered_strategy_handles_new_type() {
        let mut engine = engine();
        let calc = QuestionType::Custom("calculation".into());
        engine.register_strategy(&calc, Arc::new(HalfCreditStrategy));
        assert!(engine.supported_types().contains(&"calculation".to_string()));

        let r = engine
            .grade_question("q1", &calc, &"42".into(), &"41".into(), 6.0)
            .unwrap();
        assert_eq!(r.obtained_score, 3.0);
        assert_eq!(r.method, GradingMethod::PartialMatch);
    }

    #[test]
    fn rule_updates_take_effect() {
        let registry = Arc::new(GradingRuleRegistry::in_memory());
        let engine = GradingEngine::new(Arc::clone(&registry), EngineConfig::default());
        registry
            .update_rule(
                "fill_blank",
                RuleUpdate {
                    partial_match_score: Some(0.5),
                    ..RuleUpdate::default()
                },
            )
            .unwrap();
        let r = engine
            .grade_question("q1", &QuestionType::FillBlank, &"photosynthesys".into(), &"photosynthesis".into(), 10.0)
            .unwrap();
        assert_eq!(r.method, GradingMethod::SimilarityMatch);
        assert!((r.obtained_score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn grade_sheet_tags_student() {
        let sheet = AnswerSheet {
            student_id: "s-17".into(),
            exam_id: Some("other-exam".into()),
            answers: [("q1".to_string(), Answer::from("B"))].into_iter().collect(),
        };
        let graded = engine().grade_sheet(&sheet, &sample_exam());
        assert_eq!(graded.student_id, "s-17");
        assert_eq!(graded.result.total_score, 2.0);
    }

    #[test]
    fn empty_exam_has_zero_percentage() {
        let result = engine().grade_exam(&HashMap::new(), &ExamReference::default());
        assert_eq!(result.percentage, 0.0);
        assert_eq!(result.grading_summary.average_confidence, 0.0);
    }
}
