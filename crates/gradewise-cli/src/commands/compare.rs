//! The `gradewise compare` command.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::quality::GraderPerformance;
use gradewise_core::report::{GraderComparison, QualityReport};

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    let baseline = QualityReport::load_json(&baseline_path)?;
    let current = QualityReport::load_json(&current_path)?;

    let comparison = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => println!("{}", comparison.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&comparison)?),
        _ => print_text(&baseline, &current, &comparison),
    }

    if fail_on_regression && comparison.has_regressions() {
        tracing::warn!(
            regressions = comparison.regressions.len(),
            "grader quality regressed against baseline"
        );
        std::process::exit(1);
    }

    Ok(())
}

fn print_text(baseline: &QualityReport, current: &QualityReport, comparison: &GraderComparison) {
    let shift = &comparison.summary;
    println!(
        "Comparison: {} regressions, {} improvements, {} unchanged",
        comparison.regressions.len(),
        comparison.improvements.len(),
        comparison.unchanged
    );
    println!(
        "Records: {} -> {}",
        shift.baseline_records, shift.current_records
    );
    println!(
        "Consistency: {}",
        percent_shift(shift.baseline_consistency, shift.current_consistency)
    );
    println!(
        "Anomaly rate: {}",
        percent_shift(shift.baseline_anomaly_rate, shift.current_anomaly_rate)
    );

    println!("\n{}", grader_table(baseline, current, comparison));
}

fn percent_shift(before: f64, after: f64) -> String {
    format!(
        "{:.1}% -> {:.1}% ({:+.1}%)",
        before * 100.0,
        after * 100.0,
        (after - before) * 100.0
    )
}

fn status(comparison: &GraderComparison, grader_id: &str) -> &'static str {
    if comparison.regressions.iter().any(|c| c.grader_id == grader_id) {
        "regressed"
    } else if comparison.improvements.iter().any(|c| c.grader_id == grader_id) {
        "improved"
    } else {
        "unchanged"
    }
}

/// One row per grader in either report; graders present on one side only are
/// marked new or removed.
fn grader_table(baseline: &QualityReport, current: &QualityReport, comparison: &GraderComparison) -> Table {
    fn by_grader(report: &QualityReport) -> BTreeMap<&str, &GraderPerformance> {
        report
            .grader_performances
            .iter()
            .map(|p| (p.grader_id.as_str(), p))
            .collect()
    }

    let before = by_grader(baseline);
    let after = by_grader(current);
    let graders: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();

    let mut table = Table::new();
    table.set_header(vec!["Grader", "Records", "Overall", "Consistency", "Status"]);

    for grader in graders {
        let row = match (before.get(grader), after.get(grader)) {
            (Some(b), Some(a)) => vec![
                format!("{} -> {}", b.total_records, a.total_records),
                percent_shift(b.metrics.overall, a.metrics.overall),
                percent_shift(b.consistency_with_others, a.consistency_with_others),
                status(comparison, grader).to_string(),
            ],
            (None, Some(a)) => vec![
                a.total_records.to_string(),
                format!("{:.1}%", a.metrics.overall * 100.0),
                format!("{:.1}%", a.consistency_with_others * 100.0),
                "new".to_string(),
            ],
            (Some(b), None) => vec![
                b.total_records.to_string(),
                format!("{:.1}%", b.metrics.overall * 100.0),
                format!("{:.1}%", b.consistency_with_others * 100.0),
                "removed".to_string(),
            ],
            (None, None) => continue,
        };

        let mut cells = vec![Cell::new(grader)];
        cells.extend(row.into_iter().map(Cell::new));
        table.add_row(cells);
    }

    table
}
