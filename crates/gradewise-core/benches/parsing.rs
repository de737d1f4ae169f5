use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gradewise_core::normalize::{normalize, NormalizeOptions};
use gradewise_core::parser::parse_reference_str;

fn bench_parse_reference(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_reference");

    let small = r#"
[exam]
id = "quiz"

[[questions]]
id = "q1"
type = "single_choice"
answer = "B"
score = 2
"#;

    let large_toml = {
        let mut s = String::from("[exam]\nid = \"final\"\ntitle = \"Final\"\n");
        for i in 0..200 {
            s.push_str(&format!(
                "\n[[questions]]\nid = \"q{i}\"\ntype = \"short_answer\"\nanswer = \"answer number {i}\"\nscore = 5\n"
            ));
        }
        s
    };

    let large_json = {
        let questions: Vec<String> = (0..200)
            .map(|i| format!(r#""q{i}": {{"type": "fill_blank", "answer": "term {i}", "score": 2}}"#))
            .collect();
        format!(r#"{{"exam": {{"id": "final"}}, "questions": {{{}}}}}"#, questions.join(","))
    };

    let toml_path = PathBuf::from("bench.toml");
    let json_path = PathBuf::from("bench.json");

    group.bench_function("small_toml", |b| {
        b.iter(|| parse_reference_str(black_box(small), &toml_path))
    });

    group.bench_function("200_toml", |b| {
        b.iter(|| parse_reference_str(black_box(&large_toml), &toml_path))
    });

    group.bench_function("200_keyed_json", |b| {
        b.iter(|| parse_reference_str(black_box(&large_json), &json_path))
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let options = NormalizeOptions::default();
    let text = "  The Mitochondria, famously, is the *powerhouse* of the cell!  ".repeat(20);

    group.bench_function("mixed_punctuation", |b| {
        b.iter(|| normalize(black_box(&text), options))
    });

    group.finish();
}

criterion_group!(benches, bench_parse_reference, bench_normalize);
criterion_main!(benches);
