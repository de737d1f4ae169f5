//! Concurrent grading of many answer sheets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::engine::GradingEngine;
use crate::model::{AnswerSheet, ExamReference, StudentExamResult};
use crate::report::{FailedSheet, GradingRun};

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_sheet_start(&self, student_id: &str);
    fn on_sheet_complete(&self, result: &StudentExamResult);
    fn on_sheet_error(&self, student_id: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_sheet_start(&self, _: &str) {}
    fn on_sheet_complete(&self, _: &StudentExamResult) {}
    fn on_sheet_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Grade `sheets` against `reference`, at most `parallelism` at a time.
///
/// Grading runs on the blocking pool. Results are returned in input order;
/// a sheet whose grading task dies is reported in `failed` instead.
pub async fn grade_batch(
    engine: Arc<GradingEngine>,
    reference: Arc<ExamReference>,
    sheets: Vec<AnswerSheet>,
    parallelism: usize,
    progress: &dyn ProgressReporter,
) -> GradingRun {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let total = sheets.len();

    let mut futures = FuturesUnordered::new();
    for (index, sheet) in sheets.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        let reference = Arc::clone(&reference);
        let semaphore = Arc::clone(&semaphore);
        progress.on_sheet_start(&sheet.student_id);

        futures.push(async move {
            let student_id = sheet.student_id.clone();
            let inner = async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                let graded = tokio::task::spawn_blocking(move || engine.grade_sheet(&sheet, &reference))
                    .await?;
                anyhow::Ok(graded)
            };
            (index, student_id, inner.await)
        });
    }

    let mut graded = Vec::with_capacity(total);
    let mut failed = Vec::new();

    while let Some((index, student_id, outcome)) = futures.next().await {
        match outcome {
            Ok(result) => {
                progress.on_sheet_complete(&result);
                graded.push((index, result));
            }
            Err(e) => {
                tracing::error!("grading failed for {student_id}: {e:#}");
                progress.on_sheet_error(&student_id, &e.to_string());
                failed.push(FailedSheet {
                    student_id,
                    error: e.to_string(),
                });
            }
        }
    }

    let elapsed = start.elapsed();
    progress.on_batch_complete(total, graded.len(), failed.len(), elapsed);

    graded.sort_by_key(|(index, _)| *index);

    GradingRun {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        exam_id: reference.exam_id.clone(),
        title: reference.title.clone(),
        results: graded.into_iter().map(|(_, r)| r).collect(),
        failed,
        duration_ms: elapsed.as_millis() as u64,
    }
}
