//! The `gradewise init` command.

use std::path::Path;

use anyhow::Result;

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("gradewise.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("exams/example.toml"), EXAMPLE_REFERENCE)?;
    write_if_missing(Path::new("exams/answers/example.json"), EXAMPLE_ANSWERS)?;

    println!("\nNext steps:");
    println!("  1. Edit gradewise.toml to point at your rule and record stores");
    println!("  2. Run: gradewise validate --reference exams/example.toml");
    println!("  3. Run: gradewise grade --reference exams/example.toml --answers exams/answers --record");
    println!("  4. Run: gradewise quality report");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gradewise configuration

rules_dir = "./gradewise-rules"
records_path = "./gradewise-records.jsonl"
output_dir = "./gradewise-results"
parallelism = 4

[engine]
pass_ratio = 0.6
keyword_top_k = 10

[monitor]
min_grading_time_secs = 5.0
max_grading_time_secs = 1800.0
low_confidence_threshold = 0.5
score_variance_threshold = 0.1
consistency_threshold = 0.8
anomaly_rate_threshold = 0.1
iqr_multiplier = 1.5
min_group_size = 3
max_report_anomalies = 10
"#;

const EXAMPLE_REFERENCE: &str = r#"[exam]
id = "example"
title = "Example quiz"

[[questions]]
id = "q1"
type = "single_choice"
answer = "B"
score = 2

[[questions]]
id = "q2"
type = "multiple_choice"
answer = ["A", "C"]
score = 2

[[questions]]
id = "q3"
type = "true_false"
answer = "T"
score = 1

[[questions]]
id = "q4"
type = "fill_blank"
answer = "photosynthesis"
score = 2

[[questions]]
id = "q5"
type = "short_answer"
answer = "Water evaporates, condenses into clouds and falls back as precipitation."
score = 5
"#;

const EXAMPLE_ANSWERS: &str = r#"[
  {
    "student_id": "alice",
    "exam_id": "example",
    "answers": {
      "q1": "B",
      "q2": ["A", "C"],
      "q3": "true",
      "q4": "photosynthesis",
      "q5": "Water evaporates, condenses into clouds and falls as precipitation."
    }
  },
  {
    "student_id": "bob",
    "exam_id": "example",
    "answers": {
      "q1": "A",
      "q2": "A",
      "q3": "F",
      "q4": "photosynthesys",
      "q5": "Clouds bring rain."
    }
  }
]
"#;
