//! End-to-end pipeline: scaffold a workspace, grade it with record logging,
//! add human second opinions and audit the result.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gradewise(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gradewise").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GRADEWISE_RULES_DIR")
        .env_remove("GRADEWISE_RECORDS")
        .env("RUST_LOG", "gradewise=warn");
    cmd
}

#[test]
fn init_grade_record_and_audit() {
    let dir = TempDir::new().unwrap();

    gradewise(&dir).arg("init").assert().success();

    gradewise(&dir)
        .args(["validate", "--reference", "exams/example.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Example quiz (5 questions, 12 points)"));

    gradewise(&dir)
        .args([
            "grade",
            "--reference",
            "exams/example.toml",
            "--answers",
            "exams/answers",
            "--format",
            "all",
            "--record",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"))
        .stdout(predicate::str::contains("bob"))
        .stdout(predicate::str::contains("Logged 10 grading records"));

    let results = dir.path().join("gradewise-results");
    let outputs: Vec<String> = std::fs::read_dir(&results)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(outputs.iter().any(|n| n.ends_with(".json")));
    assert!(outputs.iter().any(|n| n.ends_with(".html")));

    // A human marker re-grades the two multiple choice answers.
    for (student, score) in [("alice", "2"), ("bob", "0")] {
        gradewise(&dir)
            .args(["quality", "record", "--exam", "example", "--question", "q2"])
            .args(["--student", student, "--grader", "ms-lee"])
            .args(["--score", score, "--max-score", "2", "--duration", "45"])
            .assert()
            .success();
    }

    gradewise(&dir)
        .args(["quality", "report", "--exam", "example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("12 records, 2 graders, 5 questions, 2 students"))
        .stdout(predicate::str::contains("gradewise"))
        .stdout(predicate::str::contains("ms-lee"));

    gradewise(&dir)
        .args(["quality", "grader", "gradewise", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"grader_kind\": \"automated\""))
        .stdout(predicate::str::contains("\"total_records\": 10"));

    gradewise(&dir)
        .args(["quality", "report", "--exam", "another-exam"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"error":"no records"}"#));
}
