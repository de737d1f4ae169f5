//! Grading quality monitor.
//!
//! Ingests an append-only log of [`GradingRecord`]s from human and automated
//! graders and audits it: real-time sanity warnings on ingest, IQR outlier
//! detection per question, inter-grader consistency, per-grader performance
//! and aggregate [`QualityReport`]s.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::report::{QualityReport, ReportSummary};
use crate::statistics::{mean, variance, IqrBounds};
use crate::traits::RecordStore;

/// Who produced a grading decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraderKind {
    #[default]
    Human,
    Automated,
}

impl fmt::Display for GraderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraderKind::Human => f.write_str("human"),
            GraderKind::Automated => f.write_str("automated"),
        }
    }
}

/// One finalized scoring decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub exam_id: String,
    pub question_id: String,
    pub student_id: String,
    pub grader_id: String,
    #[serde(default)]
    pub grader_kind: GraderKind,
    pub score: f64,
    pub max_score: f64,
    #[serde(default = "Utc::now")]
    pub grading_time: DateTime<Utc>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub comments: String,
    /// Seconds spent grading, when the grading tool measured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

fn default_confidence() -> f64 {
    1.0
}

impl GradingRecord {
    /// A human grading record timestamped now, with full confidence.
    pub fn new(
        exam_id: &str,
        question_id: &str,
        student_id: &str,
        grader_id: &str,
        score: f64,
        max_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exam_id: exam_id.to_string(),
            question_id: question_id.to_string(),
            student_id: student_id.to_string(),
            grader_id: grader_id.to_string(),
            grader_kind: GraderKind::Human,
            score,
            max_score,
            grading_time: Utc::now(),
            confidence: 1.0,
            comments: String::new(),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn at(mut self, grading_time: DateTime<Utc>) -> Self {
        self.grading_time = grading_time;
        self
    }

    /// `score / max_score`, or 0 when the max is not positive.
    pub fn score_ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            0.0
        }
    }

    fn question_key(&self) -> (&str, &str) {
        (&self.exam_id, &self.question_id)
    }
}

/// A sanity problem found when a record is ingested. Never blocks ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordWarning {
    GradingTooFast { secs: f64, min_secs: f64 },
    GradingTooSlow { secs: f64, max_secs: f64 },
    ScoreExceedsMax { score: f64, max_score: f64 },
    NegativeScore { score: f64 },
    LowConfidence { confidence: f64, threshold: f64 },
}

impl fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordWarning::GradingTooFast { secs, min_secs } => {
                write!(f, "graded in {secs:.1}s, faster than the {min_secs:.0}s minimum")
            }
            RecordWarning::GradingTooSlow { secs, max_secs } => {
                write!(f, "graded in {secs:.1}s, slower than the {max_secs:.0}s maximum")
            }
            RecordWarning::ScoreExceedsMax { score, max_score } => {
                write!(f, "score {score} exceeds max score {max_score}")
            }
            RecordWarning::NegativeScore { score } => write!(f, "negative score {score}"),
            RecordWarning::LowConfidence {
                confidence,
                threshold,
            } => write!(f, "confidence {confidence:.2} below {threshold:.2}"),
        }
    }
}

/// A record whose score ratio is an outlier within its question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub record_id: Uuid,
    pub exam_id: String,
    pub question_id: String,
    pub student_id: String,
    pub grader_id: String,
    pub score_ratio: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub reason: String,
}

/// Quality snapshot for a grader or a record population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub consistency: f64,
    pub reliability: f64,
    pub efficiency: f64,
    pub accuracy: f64,
    /// Weighted blend: consistency 0.3, reliability 0.3, efficiency 0.2,
    /// accuracy 0.2.
    pub overall: f64,
    pub anomaly_count: usize,
    pub total_records: usize,
    pub score_variance: f64,
}

impl QualityMetrics {
    pub fn blend(
        consistency: f64,
        reliability: f64,
        efficiency: f64,
        accuracy: f64,
        anomaly_count: usize,
        total_records: usize,
        score_variance: f64,
    ) -> Self {
        let overall = 0.3 * consistency + 0.3 * reliability + 0.2 * efficiency + 0.2 * accuracy;
        Self {
            consistency,
            reliability,
            efficiency,
            accuracy,
            overall,
            anomaly_count,
            total_records,
            score_variance,
        }
    }
}

/// Aggregate view of one grader's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderPerformance {
    pub grader_id: String,
    pub grader_kind: GraderKind,
    pub total_records: usize,
    pub average_score_ratio: f64,
    pub score_variance: f64,
    /// Mean consistency over questions shared with at least one other grader.
    pub consistency_with_others: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    pub metrics: QualityMetrics,
}

/// Mean score ratio of one grader on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub mean_score_ratio: f64,
    pub records: usize,
}

/// The quality monitor.
///
/// Reads run on snapshots and may proceed concurrently; `add_record` calls
/// are serialized and persist before the in-memory append.
pub struct QualityMonitor {
    config: MonitorConfig,
    records: RwLock<Vec<GradingRecord>>,
    writer: Mutex<()>,
    store: Option<Arc<dyn RecordStore>>,
}

impl fmt::Debug for QualityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityMonitor")
            .field("config", &self.config)
            .field("records", &self.len())
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl QualityMonitor {
    /// An in-memory monitor with no durability.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            records: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            store: None,
        }
    }

    /// A monitor backed by `store`, preloaded with its existing records.
    pub fn with_store(config: MonitorConfig, store: Arc<dyn RecordStore>) -> Result<Self, MonitorError> {
        let existing = store.read_all()?;
        tracing::info!(
            "quality monitor loaded {} records from {} store",
            existing.len(),
            store.name()
        );
        Ok(Self {
            config,
            records: RwLock::new(existing),
            writer: Mutex::new(()),
            store: Some(store),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every record, in ingestion order.
    pub fn records(&self) -> Vec<GradingRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sanity-check a record without ingesting it.
    pub fn check_record(&self, record: &GradingRecord) -> Vec<RecordWarning> {
        let cfg = &self.config;
        let mut warnings = Vec::new();

        if let Some(secs) = record.duration_secs {
            if secs < cfg.min_grading_time_secs {
                warnings.push(RecordWarning::GradingTooFast {
                    secs,
                    min_secs: cfg.min_grading_time_secs,
                });
            } else if secs > cfg.max_grading_time_secs {
                warnings.push(RecordWarning::GradingTooSlow {
                    secs,
                    max_secs: cfg.max_grading_time_secs,
                });
            }
        }
        if record.score > record.max_score {
            warnings.push(RecordWarning::ScoreExceedsMax {
                score: record.score,
                max_score: record.max_score,
            });
        }
        if record.score < 0.0 {
            warnings.push(RecordWarning::NegativeScore {
                score: record.score,
            });
        }
        if record.confidence < cfg.low_confidence_threshold {
            warnings.push(RecordWarning::LowConfidence {
                confidence: record.confidence,
                threshold: cfg.low_confidence_threshold,
            });
        }
        warnings
    }

    /// Append a record and return the sanity warnings it raised.
    ///
    /// A store failure is returned and leaves the in-memory log untouched.
    pub fn add_record(&self, record: GradingRecord) -> Result<Vec<RecordWarning>, MonitorError> {
        let warnings = self.check_record(&record);
        for warning in &warnings {
            tracing::warn!(
                "record {}/{} by {}: {warning}",
                record.question_id,
                record.student_id,
                record.grader_id
            );
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = &self.store {
            store.append(&record)?;
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(warnings)
    }

    /// Flag records whose score ratio falls outside the IQR fences of their
    /// question. Questions with fewer than `min_group_size` records are
    /// never flagged.
    pub fn detect_anomalies(&self, records: &[GradingRecord]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for group in group_by_question(records).values() {
            if group.len() < self.config.min_group_size.max(1) {
                continue;
            }
            let ratios: Vec<f64> = group.iter().map(|r| r.score_ratio()).collect();
            let bounds = IqrBounds::compute(&ratios, self.config.iqr_multiplier);
            for record in group {
                let ratio = record.score_ratio();
                if bounds.is_outlier(ratio) {
                    let side = if ratio < bounds.lower { "below" } else { "above" };
                    anomalies.push(Anomaly {
                        record_id: record.id,
                        exam_id: record.exam_id.clone(),
                        question_id: record.question_id.clone(),
                        student_id: record.student_id.clone(),
                        grader_id: record.grader_id.clone(),
                        score_ratio: ratio,
                        lower_bound: bounds.lower,
                        upper_bound: bounds.upper,
                        reason: format!(
                            "score ratio {ratio:.2} is {side} the expected range [{:.2}, {:.2}]",
                            bounds.lower, bounds.upper
                        ),
                    });
                }
            }
        }
        anomalies
    }

    /// Agreement of the records for one question, in [0, 1].
    pub fn calculate_consistency(&self, records: &[GradingRecord]) -> f64 {
        let refs: Vec<&GradingRecord> = records.iter().collect();
        self.group_consistency(&refs)
    }

    fn group_consistency(&self, group: &[&GradingRecord]) -> f64 {
        if group.len() < 2 {
            return 1.0;
        }
        let ratios: Vec<f64> = group.iter().map(|r| r.score_ratio()).collect();
        consistency_from_variance(variance(&ratios), self.config.score_variance_threshold)
    }

    /// Performance of one grader over the last `window_days` days, or over
    /// all time when `None`.
    pub fn analyze_grader_performance(
        &self,
        grader_id: &str,
        window_days: Option<u32>,
    ) -> Result<GraderPerformance, MonitorError> {
        let snapshot = self.records();
        self.performance(&snapshot, grader_id, window_days, Utc::now())
            .ok_or_else(|| MonitorError::NoRecordsForGrader(grader_id.to_string()))
    }

    fn performance(
        &self,
        records: &[GradingRecord],
        grader_id: &str,
        window_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Option<GraderPerformance> {
        let since = window_days.map(|d| now - Duration::days(i64::from(d)));
        let own: Vec<&GradingRecord> = records
            .iter()
            .filter(|r| r.grader_id == grader_id)
            .filter(|r| since.map_or(true, |t| r.grading_time >= t))
            .collect();
        if own.is_empty() {
            return None;
        }

        let ratios: Vec<f64> = own.iter().map(|r| r.score_ratio()).collect();
        let average = mean(&ratios);
        let score_variance = variance(&ratios);

        let by_question = group_by_question(records);
        let own_questions: BTreeSet<(&str, &str)> = own.iter().map(|r| r.question_key()).collect();
        let shared: Vec<f64> = own_questions
            .iter()
            .filter_map(|key| by_question.get(key))
            .filter(|group| group.iter().any(|r| r.grader_id != grader_id))
            .map(|group| self.group_consistency(group))
            .collect();
        let consistency = if shared.is_empty() { 1.0 } else { mean(&shared) };

        let reliability = (1.0 - score_variance).max(0.0);
        let efficiency = self.efficiency(own.iter().copied());
        let accuracy = accuracy(&own, records);

        let own_ids: BTreeSet<Uuid> = own.iter().map(|r| r.id).collect();
        let anomaly_count = self
            .detect_anomalies(records)
            .iter()
            .filter(|a| own_ids.contains(&a.record_id))
            .count();

        let grader_kind = if own.iter().any(|r| r.grader_kind == GraderKind::Automated) {
            GraderKind::Automated
        } else {
            GraderKind::Human
        };

        Some(GraderPerformance {
            grader_id: grader_id.to_string(),
            grader_kind,
            total_records: own.len(),
            average_score_ratio: average,
            score_variance,
            consistency_with_others: consistency,
            window_days,
            last_active: own.iter().map(|r| r.grading_time).max(),
            metrics: QualityMetrics::blend(
                consistency,
                reliability,
                efficiency,
                accuracy,
                anomaly_count,
                own.len(),
                score_variance,
            ),
        })
    }

    /// Share of timed records graded inside the configured time window.
    fn efficiency<'a>(&self, records: impl Iterator<Item = &'a GradingRecord>) -> f64 {
        let durations: Vec<f64> = records.filter_map(|r| r.duration_secs).collect();
        if durations.is_empty() {
            return 1.0;
        }
        let inside = durations
            .iter()
            .filter(|&&d| d >= self.config.min_grading_time_secs && d <= self.config.max_grading_time_secs)
            .count();
        inside as f64 / durations.len() as f64
    }

    /// Build a quality report over every record, or over one exam's.
    pub fn generate_quality_report(&self, exam_id: Option<&str>) -> Result<QualityReport, MonitorError> {
        let records: Vec<GradingRecord> = self
            .records()
            .into_iter()
            .filter(|r| exam_id.map_or(true, |e| r.exam_id == e))
            .collect();
        if records.is_empty() {
            return Err(MonitorError::NoRecords);
        }

        let by_question = group_by_question(&records);
        let mut consistencies = Vec::new();
        let mut variances = Vec::new();
        for group in by_question.values() {
            let graders: BTreeSet<&str> = group.iter().map(|r| r.grader_id.as_str()).collect();
            if graders.len() < 2 {
                continue;
            }
            let ratios: Vec<f64> = group.iter().map(|r| r.score_ratio()).collect();
            let v = variance(&ratios);
            variances.push(v);
            consistencies.push(consistency_from_variance(v, self.config.score_variance_threshold));
        }
        let consistency = if consistencies.is_empty() { 1.0 } else { mean(&consistencies) };
        let score_variance = mean(&variances);

        let anomalies = self.detect_anomalies(&records);
        let anomaly_rate = anomalies.len() as f64 / records.len() as f64;

        let now = Utc::now();
        let graders: BTreeSet<&str> = records.iter().map(|r| r.grader_id.as_str()).collect();
        let grader_performances: Vec<GraderPerformance> = graders
            .iter()
            .filter_map(|g| self.performance(&records, g, None, now))
            .collect();

        let efficiency = self.efficiency(records.iter());
        let accuracies: Vec<f64> = grader_performances.iter().map(|p| p.metrics.accuracy).collect();
        let metrics = QualityMetrics::blend(
            consistency,
            (1.0 - score_variance).max(0.0),
            efficiency,
            if accuracies.is_empty() { 1.0 } else { mean(&accuracies) },
            anomalies.len(),
            records.len(),
            score_variance,
        );

        let recommendations = self.recommendations(consistency, score_variance, anomaly_rate);

        let summary = ReportSummary {
            total_records: records.len(),
            total_graders: graders.len(),
            total_questions: by_question.len(),
            total_students: records
                .iter()
                .map(|r| r.student_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            anomaly_count: anomalies.len(),
            anomaly_rate,
            consistency,
            score_variance,
        };

        tracing::info!(
            "quality report: {} records, {} graders, {} anomalies",
            summary.total_records,
            summary.total_graders,
            summary.anomaly_count
        );

        Ok(QualityReport {
            id: Uuid::new_v4(),
            created_at: now,
            exam_id: exam_id.map(str::to_string),
            summary,
            metrics,
            grader_performances,
            anomalies: anomalies
                .into_iter()
                .take(self.config.max_report_anomalies)
                .collect(),
            recommendations,
        })
    }

    fn recommendations(&self, consistency: f64, score_variance: f64, anomaly_rate: f64) -> Vec<String> {
        let cfg = &self.config;
        let mut out = Vec::new();
        if consistency < cfg.consistency_threshold {
            out.push(
                "Inter-grader consistency is below target; run a calibration session on shared marking guidelines."
                    .to_string(),
            );
        }
        if score_variance > cfg.score_variance_threshold {
            out.push(
                "Scores on multiply graded questions vary widely; review the rubric for those questions."
                    .to_string(),
            );
        }
        if anomaly_rate > cfg.anomaly_rate_threshold {
            out.push("Anomaly rate is high; re-check the flagged scores with their graders.".to_string());
        }
        if out.is_empty() {
            out.push("Grading quality is good; no action needed.".to_string());
        }
        out
    }

    /// Daily mean score ratio of a grader over the last `days` days, oldest
    /// first.
    pub fn grader_trend(&self, grader_id: &str, days: u32) -> Vec<TrendPoint> {
        let since = Utc::now() - Duration::days(i64::from(days));
        let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for record in self.records() {
            if record.grader_id == grader_id && record.grading_time >= since {
                by_day
                    .entry(record.grading_time.date_naive())
                    .or_default()
                    .push(record.score_ratio());
            }
        }
        by_day
            .into_iter()
            .map(|(date, ratios)| TrendPoint {
                date,
                mean_score_ratio: mean(&ratios),
                records: ratios.len(),
            })
            .collect()
    }

    /// Time of the grader's most recent record.
    pub fn last_active(&self, grader_id: &str) -> Option<DateTime<Utc>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.grader_id == grader_id)
            .map(|r| r.grading_time)
            .max()
    }

    /// Every grader's performance, best overall score first.
    pub fn compare_graders(&self, exam_id: Option<&str>) -> Vec<GraderPerformance> {
        let records: Vec<GradingRecord> = self
            .records()
            .into_iter()
            .filter(|r| exam_id.map_or(true, |e| r.exam_id == e))
            .collect();
        let now = Utc::now();
        let graders: BTreeSet<&str> = records.iter().map(|r| r.grader_id.as_str()).collect();
        let mut performances: Vec<GraderPerformance> = graders
            .iter()
            .filter_map(|g| self.performance(&records, g, None, now))
            .collect();
        performances.sort_by(|a, b| {
            b.metrics
                .overall
                .partial_cmp(&a.metrics.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.grader_id.cmp(&b.grader_id))
        });
        performances
    }
}

fn consistency_from_variance(variance: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return if variance > 0.0 { 0.0 } else { 1.0 };
    }
    (1.0 - variance / threshold).clamp(0.0, 1.0)
}

fn group_by_question(records: &[GradingRecord]) -> BTreeMap<(&str, &str), Vec<&GradingRecord>> {
    let mut groups: BTreeMap<(&str, &str), Vec<&GradingRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.question_key()).or_default().push(record);
    }
    groups
}

/// 1 - mean |ratio - peer mean ratio| over the grader's records whose
/// (question, student) pair was also scored by someone else.
fn accuracy(own: &[&GradingRecord], all: &[GradingRecord]) -> f64 {
    let mut peers: HashMap<(&str, &str, &str), Vec<(&str, f64)>> = HashMap::new();
    for r in all {
        peers
            .entry((r.exam_id.as_str(), r.question_id.as_str(), r.student_id.as_str()))
            .or_default()
            .push((r.grader_id.as_str(), r.score_ratio()));
    }

    let deviations: Vec<f64> = own
        .iter()
        .filter_map(|r| {
            let others: Vec<f64> = peers
                .get(&(r.exam_id.as_str(), r.question_id.as_str(), r.student_id.as_str()))?
                .iter()
                .filter(|(g, _)| *g != r.grader_id)
                .map(|(_, ratio)| *ratio)
                .collect();
            (!others.is_empty()).then(|| (r.score_ratio() - mean(&others)).abs())
        })
        .collect();

    if deviations.is_empty() {
        1.0
    } else {
        (1.0 - mean(&deviations)).clamp(0.0, 1.0)
    }
}
