//! The `gradewise grade` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use gradewise_core::batch::{grade_batch, ProgressReporter};
use gradewise_core::config::load_config_from;
use gradewise_core::engine::GradingEngine;
use gradewise_core::model::StudentExamResult;
use gradewise_core::parser;
use gradewise_core::report::GradingRun;
use gradewise_report::write_run_html;

use super::{open_monitor, open_registry};

pub struct GradeArgs {
    pub reference: PathBuf,
    pub answers: PathBuf,
    pub parallelism: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub record: bool,
    pub grader: String,
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_sheet_start(&self, student_id: &str) {
        tracing::debug!("grading sheet for {student_id}");
    }

    fn on_sheet_complete(&self, result: &StudentExamResult) {
        let r = &result.result;
        eprintln!(
            "  Graded: {} {:.1}/{:.1} ({:.1}%) {}",
            result.student_id,
            r.total_score,
            r.total_max_score,
            r.percentage,
            if r.passed { "PASS" } else { "FAIL" }
        );
    }

    fn on_sheet_error(&self, student_id: &str, error: &str) {
        eprintln!("  ERROR: {student_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: GradeArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let parallelism = args.parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    let reference = parser::parse_reference(&args.reference)?;
    let sheets = parser::load_answers(&args.answers)?;
    anyhow::ensure!(
        !sheets.is_empty(),
        "no answer sheets found in {}",
        args.answers.display()
    );

    let registry = open_registry(&config)?;
    let engine = GradingEngine::new(registry, config.engine.clone());

    for w in parser::validate_reference(&reference, &engine) {
        let prefix = w.question_id.map(|id| format!("[{id}] ")).unwrap_or_default();
        eprintln!("{prefix}WARNING: {}", w.message);
    }

    eprintln!(
        "gradewise v{}: grading {} answer sheets for '{}' ({} questions)",
        env!("CARGO_PKG_VERSION"),
        sheets.len(),
        reference.exam_id,
        reference.questions.len()
    );

    let run = grade_batch(
        Arc::new(engine),
        Arc::new(reference),
        sheets,
        parallelism,
        &ConsoleReporter,
    )
    .await;

    print_summary(&run);

    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    let formats: Vec<&str> = match args.format.as_str() {
        "all" => vec!["json", "html"],
        "none" => vec![],
        other => other.split(',').map(str::trim).collect(),
    };

    if !formats.is_empty() {
        std::fs::create_dir_all(&output)?;
    }
    let timestamp = run.created_at.format("%Y-%m-%dT%H%M%S");
    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("results-{}-{timestamp}.json", run.exam_id));
                run.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("results-{}-{timestamp}.html", run.exam_id));
                write_run_html(&run, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            _ => {
                eprintln!("Unknown format: {fmt}");
            }
        }
    }

    if args.record {
        let monitor = open_monitor(&config)?;
        let mut logged = 0;
        let mut warned = 0;
        for student in &run.results {
            for record in student
                .result
                .to_records(&run.exam_id, &student.student_id, &args.grader)
            {
                let warnings = monitor.add_record(record)?;
                warned += usize::from(!warnings.is_empty());
                logged += 1;
            }
        }
        println!(
            "Logged {logged} grading records to {} ({warned} with warnings)",
            config.records_path.display()
        );
    }

    Ok(())
}

fn print_summary(run: &GradingRun) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Student", "Score", "Percentage", "Result", "Confidence"]);

    for student in &run.results {
        let r = &student.result;
        table.add_row(vec![
            Cell::new(&student.student_id),
            Cell::new(format!("{:.1} / {:.1}", r.total_score, r.total_max_score)),
            Cell::new(format!("{:.1}%", r.percentage)),
            Cell::new(if r.passed { "PASS" } else { "FAIL" }),
            Cell::new(format!("{:.2}", r.grading_summary.average_confidence)),
        ]);
    }

    println!("{table}");
    println!(
        "{} of {} passed, average {:.1}%",
        run.passed_count(),
        run.results.len(),
        run.average_percentage()
    );
}
