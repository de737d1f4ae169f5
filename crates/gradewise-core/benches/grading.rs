use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gradewise_core::config::EngineConfig;
use gradewise_core::engine::GradingEngine;
use gradewise_core::keywords::KeywordExtractor;
use gradewise_core::model::{Answer, ExamReference, QuestionType, ReferenceQuestion};
use gradewise_core::rules::GradingRuleRegistry;
use gradewise_core::similarity::similarity;

const REFERENCE_ESSAY: &str = "Photosynthesis converts light energy into chemical energy. \
Chlorophyll in the chloroplasts absorbs sunlight, water is split to release oxygen, \
and carbon dioxide is fixed into glucose through the Calvin cycle.";

const STUDENT_ESSAY: &str = "Plants use sunlight and chlorophyll to turn carbon dioxide and \
water into glucose, giving off oxygen as a by-product.";

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    group.bench_function("word", |b| {
        b.iter(|| similarity(black_box("photosynthesys"), black_box("photosynthesis")))
    });

    group.bench_function("essay", |b| {
        b.iter(|| similarity(black_box(STUDENT_ESSAY), black_box(REFERENCE_ESSAY)))
    });

    group.bench_function("cjk", |b| {
        b.iter(|| similarity(black_box("光合作用把光能转化为化学能"), black_box("光合作用将光能转变为化学能")))
    });

    group.finish();
}

fn bench_keywords(c: &mut Criterion) {
    let mut group = c.benchmark_group("keywords");
    let extractor = KeywordExtractor::default();

    group.bench_function("extract_top10", |b| {
        b.iter(|| extractor.extract(black_box(REFERENCE_ESSAY), 10))
    });

    let keywords = extractor.extract(REFERENCE_ESSAY, 10);
    group.bench_function("match", |b| {
        b.iter(|| extractor.match_keywords(black_box(STUDENT_ESSAY), black_box(&keywords)))
    });

    group.finish();
}

fn bench_grade_exam(c: &mut Criterion) {
    let mut group = c.benchmark_group("grade_exam");
    let engine = GradingEngine::new(
        Arc::new(GradingRuleRegistry::in_memory()),
        EngineConfig::default(),
    );

    let types = [
        (QuestionType::SingleChoice, Answer::from("B"), Answer::from("C")),
        (QuestionType::MultipleChoice, Answer::from(vec!["A", "C"]), Answer::from("A")),
        (QuestionType::FillBlank, Answer::from("photosynthesis"), Answer::from("photosynthesys")),
        (QuestionType::Essay, Answer::from(REFERENCE_ESSAY), Answer::from(STUDENT_ESSAY)),
    ];

    for size in [4usize, 40] {
        let mut reference = ExamReference {
            exam_id: "bench".into(),
            title: "Bench".into(),
            questions: Vec::new(),
        };
        let mut answers = HashMap::new();
        for i in 0..size {
            let (qt, correct, given) = &types[i % types.len()];
            let id = format!("q{i}");
            reference.questions.push(ReferenceQuestion {
                id: id.clone(),
                question_type: qt.clone(),
                correct_answer: correct.clone(),
                score: 5.0,
            });
            answers.insert(id, given.clone());
        }

        group.bench_function(format!("questions={size}"), |b| {
            b.iter(|| engine.grade_exam(black_box(&answers), black_box(&reference)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_similarity, bench_keywords, bench_grade_exam);
criterion_main!(benches);
