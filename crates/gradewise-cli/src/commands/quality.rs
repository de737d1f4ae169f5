//! The `gradewise quality` commands.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::config::load_config_from;
use gradewise_core::error::MonitorError;
use gradewise_core::quality::{GraderPerformance, GradingRecord};
use gradewise_core::report::QualityReport;
use gradewise_report::write_quality_html;

use super::open_monitor;

/// Arguments of `gradewise quality record`.
pub struct RecordArgs {
    pub exam: String,
    pub question: String,
    pub student: String,
    pub grader: String,
    pub score: f64,
    pub max_score: f64,
    pub duration: Option<f64>,
    pub confidence: Option<f64>,
    pub comments: Option<String>,
}

pub fn record(args: RecordArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let monitor = open_monitor(&config)?;

    let mut record = GradingRecord::new(
        &args.exam,
        &args.question,
        &args.student,
        &args.grader,
        args.score,
        args.max_score,
    );
    if let Some(secs) = args.duration {
        record = record.with_duration(secs);
    }
    if let Some(confidence) = args.confidence {
        record = record.with_confidence(confidence);
    }
    if let Some(comments) = args.comments {
        record.comments = comments;
    }

    let id = record.id;
    let warnings = monitor.add_record(record)?;
    println!("Recorded {id}");
    for w in &warnings {
        println!("  WARNING: {w}");
    }
    Ok(())
}

pub fn report(
    exam: Option<String>,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let monitor = open_monitor(&config)?;

    let report = match monitor.generate_quality_report(exam.as_deref()) {
        Ok(report) => report,
        Err(e @ MonitorError::NoRecords) => {
            println!("{}", e.to_json());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match format.as_str() {
        "json" => match &output {
            Some(path) => {
                report.save_json(path)?;
                eprintln!("Quality report saved to: {}", path.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&report)?),
        },
        "markdown" | "md" => match &output {
            Some(path) => {
                std::fs::write(path, report.to_markdown())?;
                eprintln!("Quality report saved to: {}", path.display());
            }
            None => println!("{}", report.to_markdown()),
        },
        "html" => {
            let path = output.unwrap_or_else(|| {
                let timestamp = report.created_at.format("%Y-%m-%dT%H%M%S");
                config.output_dir.join(format!("quality-{timestamp}.html"))
            });
            write_quality_html(&report, &path)?;
            eprintln!("HTML report: {}", path.display());
        }
        _ => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &QualityReport) {
    let s = &report.summary;
    println!(
        "Quality report ({}): {} records, {} graders, {} questions, {} students",
        report.exam_id.as_deref().unwrap_or("all exams"),
        s.total_records,
        s.total_graders,
        s.total_questions,
        s.total_students
    );
    println!(
        "Overall {:.1}% | consistency {:.1}% | score variance {:.4} | anomalies {} ({:.1}%)",
        report.metrics.overall * 100.0,
        s.consistency * 100.0,
        s.score_variance,
        s.anomaly_count,
        s.anomaly_rate * 100.0
    );

    println!("\n{}", performance_table(&report.grader_performances));

    if !report.anomalies.is_empty() {
        println!("\nAnomalies:");
        for a in &report.anomalies {
            println!(
                "  {}/{} student {} grader {}: {}",
                a.exam_id, a.question_id, a.student_id, a.grader_id, a.reason
            );
        }
    }

    println!("\nRecommendations:");
    for r in &report.recommendations {
        println!("  - {r}");
    }
}

fn performance_table(performances: &[GraderPerformance]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Grader",
        "Kind",
        "Records",
        "Avg ratio",
        "Consistency",
        "Efficiency",
        "Accuracy",
        "Anomalies",
        "Overall",
    ]);
    for p in performances {
        let m = &p.metrics;
        table.add_row(vec![
            Cell::new(&p.grader_id),
            Cell::new(p.grader_kind),
            Cell::new(p.total_records),
            Cell::new(format!("{:.2}", p.average_score_ratio)),
            Cell::new(format!("{:.1}%", p.consistency_with_others * 100.0)),
            Cell::new(format!("{:.1}%", m.efficiency * 100.0)),
            Cell::new(format!("{:.1}%", m.accuracy * 100.0)),
            Cell::new(m.anomaly_count),
            Cell::new(format!("{:.1}%", m.overall * 100.0)),
        ]);
    }
    table
}

pub fn grader(
    grader_id: &str,
    days: Option<u32>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let monitor = open_monitor(&config)?;

    let performance = match monitor.analyze_grader_performance(grader_id, days) {
        Ok(p) => p,
        Err(e @ MonitorError::NoRecordsForGrader(_)) => {
            println!("{}", e.to_json());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let trend = monitor.grader_trend(grader_id, days.unwrap_or(30));

    if format == "json" {
        let doc = serde_json::json!({
            "performance": performance,
            "trend": trend,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let window = days
        .map(|d| format!("last {d} days"))
        .unwrap_or_else(|| "all time".to_string());
    println!(
        "Grader {} ({}), {window}: {} records",
        performance.grader_id, performance.grader_kind, performance.total_records
    );
    if let Some(last) = monitor.last_active(grader_id) {
        println!("Last active: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    let m = &performance.metrics;
    println!(
        "Average ratio {:.2} | variance {:.4} | consistency {:.1}% | reliability {:.1}% | efficiency {:.1}% | accuracy {:.1}%",
        performance.average_score_ratio,
        performance.score_variance,
        m.consistency * 100.0,
        m.reliability * 100.0,
        m.efficiency * 100.0,
        m.accuracy * 100.0
    );
    println!("Overall: {:.1}%", m.overall * 100.0);

    if !trend.is_empty() {
        println!("\nDaily trend:");
        for point in &trend {
            println!(
                "  {}  {:.2} ({} records)",
                point.date, point.mean_score_ratio, point.records
            );
        }
    }

    Ok(())
}

pub fn graders(exam: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let monitor = open_monitor(&config)?;

    let performances = monitor.compare_graders(exam.as_deref());
    if performances.is_empty() {
        println!("{}", MonitorError::NoRecords.to_json());
        return Ok(());
    }
    println!("{}", performance_table(&performances));
    Ok(())
}
