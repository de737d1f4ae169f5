//! HTML report generator.
//!
//! Produces self-contained HTML files with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use gradewise_core::model::GradingMethod;
use gradewise_core::report::{GradingRun, QualityReport};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn page_start(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape(title)));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");
}

fn page_end(html: &mut String, raw_json: &str) {
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(raw_json));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");
    html.push_str("</body>\n</html>");
}

fn ratio_class(ratio: f64) -> &'static str {
    if ratio >= 0.8 {
        "pass"
    } else if ratio >= 0.5 {
        "warn"
    } else {
        "fail"
    }
}

/// Generate an HTML page for a grading run.
pub fn generate_run_html(run: &GradingRun) -> String {
    let mut html = String::new();
    let name = if run.title.is_empty() { &run.exam_id } else { &run.title };
    page_start(&mut html, &format!("gradewise results: {name}"));

    html.push_str("<header>\n");
    html.push_str("<h1>gradewise results</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Exam: <strong>{}</strong> | {} students | {} passed | average {:.1}% | {}</p>\n",
        html_escape(name),
        run.results.len(),
        run.passed_count(),
        run.average_percentage(),
        run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Students</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Student</th><th onclick=\"sortTable(1)\">Score</th><th onclick=\"sortTable(2)\">Percentage</th><th onclick=\"sortTable(3)\">Result</th><th onclick=\"sortTable(4)\">Confidence</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for s in &run.results {
        let r = &s.result;
        let class = if r.passed { "pass" } else { "fail" };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.1} / {:.1}</td><td>{:.1}%</td><td class=\"{}\">{}</td><td>{:.2}</td></tr>\n",
            html_escape(&s.student_id),
            r.total_score,
            r.total_max_score,
            r.percentage,
            class,
            if r.passed { "PASS" } else { "FAIL" },
            r.grading_summary.average_confidence,
        ));
    }
    html.push_str("</tbody></table>\n");

    let bars: Vec<(String, f64)> = run
        .results
        .iter()
        .map(|s| (s.student_id.clone(), s.result.percentage / 100.0))
        .collect();
    if !bars.is_empty() {
        html.push_str(&generate_bar_chart(&bars));
    }
    html.push_str("</section>\n");

    if !run.failed.is_empty() {
        html.push_str("<section class=\"failures\">\n<h2>Not graded</h2>\n<ul>\n");
        for f in &run.failed {
            html.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>\n",
                html_escape(&f.student_id),
                html_escape(&f.error)
            ));
        }
        html.push_str("</ul>\n</section>\n");
    }

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Questions</h2>\n");
    for s in &run.results {
        html.push_str(&format!(
            "<details>\n<summary>{}</summary>\n",
            html_escape(&s.student_id)
        ));
        html.push_str("<table>\n<thead><tr><th>Question</th><th>Type</th><th>Answer</th><th>Score</th><th>Method</th><th>Feedback</th></tr></thead>\n<tbody>\n");
        for q in &s.result.question_results {
            let class = if q.method == GradingMethod::Error {
                "fail"
            } else {
                ratio_class(q.score_ratio)
            };
            html.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{:.2} / {:.2}</td><td>{}</td><td>{}</td></tr>\n",
                class,
                html_escape(&q.question_id),
                q.question_type,
                html_escape(&q.student_answer.as_text()),
                q.obtained_score,
                q.max_score,
                q.method,
                html_escape(&q.feedback),
            ));
        }
        html.push_str("</tbody></table>\n</details>\n");
    }
    html.push_str("</section>\n");

    page_end(&mut html, &serde_json::to_string_pretty(run).unwrap_or_default());
    html
}

/// Generate an HTML page for a quality report.
pub fn generate_quality_html(report: &QualityReport) -> String {
    let mut html = String::new();
    let scope = report.exam_id.as_deref().unwrap_or("all exams");
    page_start(&mut html, &format!("gradewise quality: {scope}"));

    let s = &report.summary;
    html.push_str("<header>\n");
    html.push_str("<h1>gradewise quality report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Scope: <strong>{}</strong> | {} records | {} graders | {} questions | {}</p>\n",
        html_escape(scope),
        s.total_records,
        s.total_graders,
        s.total_questions,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n<tbody>\n");
    let m = &report.metrics;
    for (label, value) in [
        ("Overall quality", m.overall),
        ("Consistency", s.consistency),
        ("Reliability", m.reliability),
        ("Efficiency", m.efficiency),
        ("Accuracy", m.accuracy),
    ] {
        html.push_str(&format!(
            "<tr><th>{label}</th><td class=\"{}\">{:.1}%</td></tr>\n",
            ratio_class(value),
            value * 100.0
        ));
    }
    html.push_str(&format!(
        "<tr><th>Score variance</th><td>{:.4}</td></tr>\n<tr><th>Anomalies</th><td>{} ({:.1}%)</td></tr>\n",
        s.score_variance,
        s.anomaly_count,
        s.anomaly_rate * 100.0
    ));
    html.push_str("</tbody></table>\n");

    html.push_str("<h2>Recommendations</h2>\n<ul>\n");
    for r in &report.recommendations {
        html.push_str(&format!("<li>{}</li>\n", html_escape(r)));
    }
    html.push_str("</ul>\n</section>\n");

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Graders</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Grader</th><th onclick=\"sortTable(1)\">Kind</th><th onclick=\"sortTable(2)\">Records</th><th onclick=\"sortTable(3)\">Avg ratio</th><th onclick=\"sortTable(4)\">Consistency</th><th onclick=\"sortTable(5)\">Anomalies</th><th onclick=\"sortTable(6)\">Overall</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for p in &report.grader_performances {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}%</td><td>{}</td><td class=\"{}\">{:.1}%</td></tr>\n",
            html_escape(&p.grader_id),
            p.grader_kind,
            p.total_records,
            p.average_score_ratio,
            p.consistency_with_others * 100.0,
            p.metrics.anomaly_count,
            ratio_class(p.metrics.overall),
            p.metrics.overall * 100.0,
        ));
    }
    html.push_str("</tbody></table>\n");

    let bars: Vec<(String, f64)> = report
        .grader_performances
        .iter()
        .map(|p| (p.grader_id.clone(), p.metrics.overall))
        .collect();
    if !bars.is_empty() {
        html.push_str(&generate_bar_chart(&bars));
    }

    if !report.anomalies.is_empty() {
        html.push_str("<h2>Anomalies</h2>\n");
        html.push_str("<table>\n<thead><tr><th>Question</th><th>Student</th><th>Grader</th><th>Ratio</th><th>Reason</th></tr></thead>\n<tbody>\n");
        for a in &report.anomalies {
            html.push_str(&format!(
                "<tr class=\"fail\"><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n",
                html_escape(&a.question_id),
                html_escape(&a.student_id),
                html_escape(&a.grader_id),
                a.score_ratio,
                html_escape(&a.reason),
            ));
        }
        html.push_str("</tbody></table>\n");
    }
    html.push_str("</section>\n");

    page_end(&mut html, &serde_json::to_string_pretty(report).unwrap_or_default());
    html
}

fn write_html(html: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

/// Write a grading run HTML page to a file.
pub fn write_run_html(run: &GradingRun, path: &Path) -> Result<()> {
    write_html(&generate_run_html(run), path)
}

/// Write a quality report HTML page to a file.
pub fn write_quality_html(report: &QualityReport, path: &Path) -> Result<()> {
    write_html(&generate_quality_html(report), path)
}

/// Horizontal bars for values in [0, 1].
fn generate_bar_chart(items: &[(String, f64)]) -> String {
    let bar_height = 24;
    let max_width = 400;
    let padding = 8;
    let label_width = 200;

    let total_height = items.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, (label, value)) in items.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (value.clamp(0.0, 1.0) * max_width as f64) as usize;

        let color = if *value >= 0.8 {
            "#22c55e"
        } else if *value >= 0.5 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(label)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.1}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            value * 100.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --warn: #fef9c3; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --warn: #713f12; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.warn { background: var(--warn); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    if (!isNaN(na) && !isNaN(nb)) return asc ? na - nb : nb - na;
    return asc ? va.localeCompare(vb) : vb.localeCompare(va);
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use gradewise_core::config::{EngineConfig, MonitorConfig};
    use gradewise_core::engine::GradingEngine;
    use gradewise_core::model::{Answer, ExamReference, QuestionType, ReferenceQuestion, StudentExamResult};
    use gradewise_core::quality::{GradingRecord, QualityMonitor};
    use gradewise_core::report::FailedSheet;
    use gradewise_core::rules::GradingRuleRegistry;

    fn make_run() -> GradingRun {
        let engine = GradingEngine::new(Arc::new(GradingRuleRegistry::in_memory()), EngineConfig::default());
        let reference = ExamReference {
            exam_id: "chem-1".into(),
            title: "Chemistry <quiz>".into(),
            questions: vec![ReferenceQuestion {
                id: "q1".into(),
                question_type: QuestionType::FillBlank,
                correct_answer: "oxygen".into(),
                score: 2.0,
            }],
        };
        let answers: HashMap<String, Answer> = [("q1".to_string(), Answer::from("oxygen"))].into_iter().collect();
        GradingRun {
            id: uuid::Uuid::nil(),
            created_at: chrono::Utc::now(),
            exam_id: reference.exam_id.clone(),
            title: reference.title.clone(),
            results: vec![StudentExamResult {
                student_id: "student-1".into(),
                result: engine.grade_exam(&answers, &reference),
            }],
            failed: vec![FailedSheet {
                student_id: "student-2".into(),
                error: "task died".into(),
            }],
            duration_ms: 5,
        }
    }

    fn make_quality_report() -> QualityReport {
        let monitor = QualityMonitor::new(MonitorConfig::default());
        for grader in ["alice", "bob"] {
            monitor
                .add_record(GradingRecord::new("chem-1", "q1", "s1", grader, 4.0, 5.0))
                .unwrap();
        }
        monitor.generate_quality_report(Some("chem-1")).unwrap()
    }

    #[test]
    fn run_html_contains_required_elements() {
        let html = generate_run_html(&make_run());
        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("student-1"));
        assert!(html.contains("Chemistry &lt;quiz&gt;"));
        assert!(!html.contains("Chemistry <quiz>"));
        assert!(html.contains("PASS"));
        assert!(html.contains("task died"));
        assert!(html.contains("exact_match"));
    }

    #[test]
    fn quality_html_contains_graders_and_recommendations() {
        let html = generate_quality_html(&make_quality_report());
        assert!(html.contains("alice"));
        assert!(html.contains("bob"));
        assert!(html.contains("Recommendations"));
        assert!(html.contains("quality is good"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn html_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let run_path = dir.path().join("out").join("results.html");
        let quality_path = dir.path().join("quality.html");

        write_run_html(&make_run(), &run_path).unwrap();
        write_quality_html(&make_quality_report(), &quality_path).unwrap();

        assert!(std::fs::read_to_string(&run_path).unwrap().contains("<html"));
        assert!(std::fs::read_to_string(&quality_path).unwrap().contains("<html"));
    }
}
