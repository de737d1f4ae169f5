//! Report types with JSON persistence and regression detection.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::StudentExamResult;
use crate::quality::{Anomaly, GraderPerformance, QualityMetrics};

fn save_pretty_json<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| format!("failed to serialize {what}"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("failed to write {what} to {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Grading runs
// ---------------------------------------------------------------------------

/// An answer sheet that could not be graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSheet {
    pub student_id: String,
    pub error: String,
}

/// The graded results of one batch of answer sheets against one exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub exam_id: String,
    #[serde(default)]
    pub title: String,
    pub results: Vec<StudentExamResult>,
    #[serde(default)]
    pub failed: Vec<FailedSheet>,
    pub duration_ms: u64,
}

impl GradingRun {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.result.passed).count()
    }

    /// Mean percentage across graded sheets, 0 when none were graded.
    pub fn average_percentage(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.results.iter().map(|r| r.result.percentage).sum::<f64>() / self.results.len() as f64
    }

    /// Save the run as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_pretty_json(self, path, "grading results")
    }

    /// Load a run from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read grading results from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse grading results JSON")
    }
}

// ---------------------------------------------------------------------------
// Quality reports
// ---------------------------------------------------------------------------

/// Headline numbers of a quality report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_records: usize,
    pub total_graders: usize,
    pub total_questions: usize,
    pub total_students: usize,
    pub anomaly_count: usize,
    pub anomaly_rate: f64,
    /// Mean consistency over questions scored by two or more graders.
    pub consistency: f64,
    /// Mean score-ratio variance over the same questions.
    pub score_variance: f64,
}

/// Aggregate grading quality over a set of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    pub summary: ReportSummary,
    pub metrics: QualityMetrics,
    pub grader_performances: Vec<GraderPerformance>,
    /// Example anomalies, capped at the configured maximum.
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<String>,
}

impl QualityReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_pretty_json(self, path, "quality report")
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: QualityReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let s = &self.summary;

        md.push_str("## Grading Quality Report\n\n");
        if let Some(exam) = &self.exam_id {
            md.push_str(&format!("**Exam:** {exam}\n\n"));
        }
        md.push_str(&format!(
            "**Summary:** {} records, {} graders, {} questions, {} students\n\n",
            s.total_records, s.total_graders, s.total_questions, s.total_students
        ));
        md.push_str(&format!(
            "- Consistency: {:.1}%\n- Score variance: {:.4}\n- Anomalies: {} ({:.1}%)\n- Overall quality: {:.1}%\n\n",
            s.consistency * 100.0,
            s.score_variance,
            s.anomaly_count,
            s.anomaly_rate * 100.0,
            self.metrics.overall * 100.0
        ));

        if !self.grader_performances.is_empty() {
            md.push_str("### Graders\n\n");
            md.push_str("| Grader | Kind | Records | Avg ratio | Consistency | Overall |\n");
            md.push_str("|--------|------|---------|-----------|-------------|---------|\n");
            for p in &self.grader_performances {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.2} | {:.1}% | {:.1}% |\n",
                    p.grader_id,
                    p.grader_kind,
                    p.total_records,
                    p.average_score_ratio,
                    p.consistency_with_others * 100.0,
                    p.metrics.overall * 100.0
                ));
            }
            md.push('\n');
        }

        if !self.anomalies.is_empty() {
            md.push_str("### Anomalies\n\n");
            md.push_str("| Question | Student | Grader | Ratio | Reason |\n");
            md.push_str("|----------|---------|--------|-------|--------|\n");
            for a in &self.anomalies {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.2} | {} |\n",
                    a.question_id, a.student_id, a.grader_id, a.score_ratio, a.reason
                ));
            }
            md.push('\n');
        }

        md.push_str("### Recommendations\n\n");
        for r in &self.recommendations {
            md.push_str(&format!("- {r}\n"));
        }

        md
    }

    /// Compare per-grader overall scores against a baseline report.
    pub fn compare(&self, baseline: &QualityReport, threshold: f64) -> GraderComparison {
        let by_grader = |report: &QualityReport| -> HashMap<String, (f64, f64)> {
            report
                .grader_performances
                .iter()
                .map(|p| (p.grader_id.clone(), (p.metrics.overall, p.consistency_with_others)))
                .collect()
        };

        let baseline_scores = by_grader(baseline);
        let current_scores = by_grader(self);

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_graders = 0usize;

        for (grader_id, &(current, current_consistency)) in &current_scores {
            match baseline_scores.get(grader_id) {
                Some(&(baseline_score, baseline_consistency)) => {
                    let delta = current - baseline_score;
                    let change = GraderChange {
                        grader_id: grader_id.clone(),
                        baseline_score,
                        current_score: current,
                        delta,
                        baseline_consistency,
                        current_consistency,
                    };
                    if delta < -threshold {
                        regressions.push(change);
                    } else if delta > threshold {
                        improvements.push(change);
                    } else {
                        unchanged += 1;
                    }
                }
                None => new_graders += 1,
            }
        }

        regressions.sort_by(|a, b| a.grader_id.cmp(&b.grader_id));
        improvements.sort_by(|a, b| a.grader_id.cmp(&b.grader_id));

        let removed_graders = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .count();

        GraderComparison {
            regressions,
            improvements,
            unchanged,
            new_graders,
            removed_graders,
            summary: SummaryShift {
                baseline_records: baseline.summary.total_records,
                current_records: self.summary.total_records,
                baseline_consistency: baseline.summary.consistency,
                current_consistency: self.summary.consistency,
                baseline_anomaly_rate: baseline.summary.anomaly_rate,
                current_anomaly_rate: self.summary.anomaly_rate,
            },
        }
    }
}

/// Result of comparing two quality reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderComparison {
    /// Graders whose overall score went down.
    pub regressions: Vec<GraderChange>,
    /// Graders whose overall score went up.
    pub improvements: Vec<GraderChange>,
    pub unchanged: usize,
    /// Graders in current but not baseline.
    pub new_graders: usize,
    /// Graders in baseline but not current.
    pub removed_graders: usize,
    #[serde(default)]
    pub summary: SummaryShift,
}

/// Report-level figures of the baseline next to the current report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryShift {
    pub baseline_records: usize,
    pub current_records: usize,
    pub baseline_consistency: f64,
    pub current_consistency: f64,
    pub baseline_anomaly_rate: f64,
    pub current_anomaly_rate: f64,
}

impl SummaryShift {
    pub fn consistency_delta(&self) -> f64 {
        self.current_consistency - self.baseline_consistency
    }

    pub fn anomaly_rate_delta(&self) -> f64 {
        self.current_anomaly_rate - self.baseline_anomaly_rate
    }
}

/// One grader's overall-score change between two reports.
///
/// Consistency is carried alongside; only the overall score decides whether
/// the change counts as a regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderChange {
    pub grader_id: String,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
    #[serde(default)]
    pub baseline_consistency: f64,
    #[serde(default)]
    pub current_consistency: f64,
}

impl GraderChange {
    pub fn consistency_delta(&self) -> f64 {
        self.current_consistency - self.baseline_consistency
    }
}

impl GraderComparison {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.unchanged
        ));
        md.push_str(&format!(
            "**Records:** {} -> {}, **consistency:** {:.1}% -> {:.1}% ({:+.1}%), **anomaly rate:** {:.1}% -> {:.1}%\n\n",
            self.summary.baseline_records,
            self.summary.current_records,
            self.summary.baseline_consistency * 100.0,
            self.summary.current_consistency * 100.0,
            self.summary.consistency_delta() * 100.0,
            self.summary.baseline_anomaly_rate * 100.0,
            self.summary.current_anomaly_rate * 100.0,
        ));

        for (title, changes) in [("Regressions", &self.regressions), ("Improvements", &self.improvements)] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Grader | Baseline | Current | Delta | Consistency |\n");
            md.push_str("|--------|----------|---------|-------|-------------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {:.1}% | {:.1}% | {:+.1}% | {:.1}% -> {:.1}% |\n",
                    c.grader_id,
                    c.baseline_score * 100.0,
                    c.current_score * 100.0,
                    c.delta * 100.0,
                    c.baseline_consistency * 100.0,
                    c.current_consistency * 100.0
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::GraderKind;

    fn performance(grader_id: &str, overall: f64) -> GraderPerformance {
        GraderPerformance {
            grader_id: grader_id.into(),
            grader_kind: GraderKind::Human,
            total_records: 4,
            average_score_ratio: 0.7,
            score_variance: 0.01,
            consistency_with_others: 0.9,
            window_days: None,
            last_active: None,
            metrics: QualityMetrics {
                consistency: 0.9,
                reliability: 0.99,
                efficiency: 1.0,
                accuracy: 1.0,
                overall,
                anomaly_count: 0,
                total_records: 4,
                score_variance: 0.01,
            },
        }
    }

    fn make_report(performances: Vec<GraderPerformance>) -> QualityReport {
        QualityReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            exam_id: Some("midterm".into()),
            summary: ReportSummary {
                total_records: 8,
                total_graders: performances.len(),
                total_questions: 2,
                total_students: 2,
                anomaly_count: 0,
                anomaly_rate: 0.0,
                consistency: 0.9,
                score_variance: 0.01,
            },
            metrics: performances
                .first()
                .map(|p| p.metrics.clone())
                .unwrap_or_else(|| performance("none", 0.0).metrics),
            grader_performances: performances,
            anomalies: vec![],
            recommendations: vec!["Grading quality is good; no action needed.".into()],
        }
    }

    #[test]
    fn compare_identical_reports() {
        let baseline = make_report(vec![performance("alice", 0.9)]);
        let current = make_report(vec![performance("alice", 0.9)]);
        let cmp = current.compare(&baseline, 0.05);
        assert!(!cmp.has_regressions());
        assert!(cmp.improvements.is_empty());
        assert_eq!(cmp.unchanged, 1);
    }

    #[test]
    fn compare_with_regression_and_improvement() {
        let baseline = make_report(vec![performance("alice", 0.9), performance("bob", 0.6)]);
        let current = make_report(vec![performance("alice", 0.7), performance("bob", 0.8)]);
        let cmp = current.compare(&baseline, 0.05);
        assert_eq!(cmp.regressions.len(), 1);
        assert_eq!(cmp.regressions[0].grader_id, "alice");
        assert_eq!(cmp.improvements.len(), 1);
        assert_eq!(cmp.improvements[0].grader_id, "bob");
    }

    #[test]
    fn compare_carries_consistency_shift() {
        let baseline = make_report(vec![performance("alice", 0.9)]);
        let mut drifted = performance("alice", 0.7);
        drifted.consistency_with_others = 0.6;
        let mut current = make_report(vec![drifted]);
        current.summary.consistency = 0.6;
        current.summary.anomaly_rate = 0.25;
        current.summary.total_records = 12;

        let cmp = current.compare(&baseline, 0.05);
        let change = &cmp.regressions[0];
        assert!((change.baseline_consistency - 0.9).abs() < 1e-9);
        assert!((change.consistency_delta() + 0.3).abs() < 1e-9);
        assert_eq!(cmp.summary.baseline_records, 8);
        assert_eq!(cmp.summary.current_records, 12);
        assert!((cmp.summary.consistency_delta() + 0.3).abs() < 1e-9);
        assert!((cmp.summary.anomaly_rate_delta() - 0.25).abs() < 1e-9);

        let md = cmp.to_markdown();
        assert!(md.contains("90.0% -> 60.0%"));
        assert!(md.contains("**Records:** 8 -> 12"));
    }

    #[test]
    fn compare_with_new_and_removed() {
        let baseline = make_report(vec![performance("old", 0.9)]);
        let current = make_report(vec![performance("new", 0.9)]);
        let cmp = current.compare(&baseline, 0.05);
        assert_eq!(cmp.new_graders, 1);
        assert_eq!(cmp.removed_graders, 1);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(vec![performance("alice", 0.9)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quality.json");

        report.save_json(&path).unwrap();
        let loaded = QualityReport::load_json(&path).unwrap();

        assert_eq!(loaded.exam_id.as_deref(), Some("midterm"));
        assert_eq!(loaded.grader_performances.len(), 1);
        assert_eq!(loaded.summary, report.summary);
    }

    #[test]
    fn markdown_output() {
        let report = make_report(vec![performance("alice", 0.9)]);
        let md = report.to_markdown();
        assert!(md.contains("Grading Quality Report"));
        assert!(md.contains("| alice | human | 4 |"));
        assert!(md.contains("quality is good"));

        let baseline = make_report(vec![performance("alice", 0.95)]);
        let cmp = report.compare(&baseline, 0.01).to_markdown();
        assert!(cmp.contains("Regressions"));
        assert!(cmp.contains("-5.0%"));
    }

    #[test]
    fn empty_run_has_zero_average() {
        let run = GradingRun {
            id: Uuid::nil(),
            created_at: Utc::now(),
            exam_id: "e".into(),
            title: String::new(),
            results: vec![],
            failed: vec![],
            duration_ms: 0,
        };
        assert_eq!(run.average_percentage(), 0.0);
        assert_eq!(run.passed_count(), 0);
    }
}
