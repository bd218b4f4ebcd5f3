//! Batch scheduler
//!
//! Enumerates the input root, dispatches one task per file onto the worker
//! pool and aggregates the results. A failing or panicking task only affects
//! its own result.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::config::TargetConfig;
use crate::error::{ErrorKind, PrepError, Result};
use crate::transcode::transcode_file;

use super::pool::WorkerPool;
use super::scanner::{scan, ScanResult, Task};
use super::summary::{BatchOutcome, BatchSummary, TaskResult};

/// Runs the transcode engine over every eligible file under a root.
pub struct Scheduler {
    target: TargetConfig,
    pool: WorkerPool,
    abort: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(target: TargetConfig, pool: WorkerPool) -> Self {
        Self {
            target,
            pool,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops dispatching new tasks once set. Tasks already running
    /// finish normally.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Scan `input_root` and normalize every eligible file into `output_root`.
    ///
    /// `on_result` is called once per task, in completion order.
    pub async fn run<F>(&self, input_root: &Path, output_root: &Path, on_result: F) -> Result<BatchOutcome>
    where
        F: FnMut(&TaskResult),
    {
        let (input_root, output_root) = (input_root.to_path_buf(), output_root.to_path_buf());
        let scanned = tokio::task::spawn_blocking(move || scan(&input_root, &output_root))
            .await
            .map_err(|e| PrepError::Worker(format!("scan task failed: {}", e)))?;

        if scanned.is_empty() {
            tracing::info!("no eligible audio files found");
            return Ok(BatchOutcome::NoFilesFound);
        }
        Ok(BatchOutcome::Completed(self.execute(scanned, on_result).await?))
    }

    /// Run already-enumerated tasks.
    pub async fn execute<F>(&self, scanned: ScanResult, mut on_result: F) -> Result<BatchSummary>
    where
        F: FnMut(&TaskResult),
    {
        let mut summary = BatchSummary::new(scanned.discovered(), self.pool.size());
        tracing::info!(
            files = scanned.discovered(),
            workers = self.pool.size(),
            "starting batch"
        );

        for collision in scanned.collisions {
            let result = TaskResult::failure(
                collision.input,
                collision.output.clone(),
                &PrepError::OutputCollision {
                    output: collision.output,
                    claimed_by: collision.claimed_by,
                },
                0,
            );
            on_result(&result);
            summary.record(&result);
        }

        for task in scanned.overwrites {
            let err = PrepError::OutputOverwritesInput(task.output.clone());
            let result = TaskResult::failure(task.input, task.output, &err, 0);
            on_result(&result);
            summary.record(&result);
        }

        let mut in_flight: JoinSet<TaskResult> = JoinSet::new();
        let mut dispatched: Vec<Task> = Vec::with_capacity(scanned.tasks.len());
        let mut reported: HashSet<PathBuf> = HashSet::new();
        let mut pending = scanned.tasks.into_iter();

        while let Some(task) = pending.next() {
            // Collect finished results while waiting for a free worker
            let permit = loop {
                tokio::select! {
                    permit = self.pool.acquire() => break permit?,
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Some(result) = joined_result(joined) {
                            reported.insert(result.input.clone());
                            on_result(&result);
                            summary.record(&result);
                        }
                    }
                }
            };

            if self.abort.load(Ordering::SeqCst) {
                summary.skipped = 1 + pending.len();
                tracing::warn!(skipped = summary.skipped, "abort requested, not dispatching remaining files");
                drop(permit);
                break;
            }

            let job_task = task.clone();
            let target = self.target;
            self.pool
                .spawn(&mut in_flight, permit, move || run_task(job_task, &target));
            dispatched.push(task);
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Some(result) = joined_result(joined) {
                reported.insert(result.input.clone());
                on_result(&result);
                summary.record(&result);
            }
        }

        // Every dispatched task reports exactly once, even if its worker vanished
        for task in dispatched {
            if !reported.contains(&task.input) {
                let result = TaskResult::failure_with(
                    task.input,
                    task.output,
                    ErrorKind::Internal,
                    "worker terminated without reporting a result".into(),
                    0,
                );
                on_result(&result);
                summary.record(&result);
            }
        }

        summary.finish();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
            "batch finished"
        );
        Ok(summary)
    }
}

/// Transcode one file and convert every way it can end into a `TaskResult`.
fn run_task(task: Task, target: &TargetConfig) -> TaskResult {
    let started = Instant::now();
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        transcode_file(&task.input, &task.output, target)
    }));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(report)) => {
            tracing::debug!(input = %task.input.display(), "processed");
            TaskResult::success(task.input, task.output, &report)
        }
        Ok(Err(e)) => {
            tracing::debug!(input = %task.input.display(), kind = %e.kind(), error = %e, "failed");
            TaskResult::failure(task.input, task.output, &e, elapsed_ms)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(input = %task.input.display(), panic = %message, "worker panicked");
            TaskResult::failure_with(
                task.input,
                task.output,
                ErrorKind::Internal,
                format!("worker panicked: {}", message),
                elapsed_ms,
            )
        }
    }
}

fn joined_result(joined: std::result::Result<TaskResult, tokio::task::JoinError>) -> Option<TaskResult> {
    match joined {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::error!(error = %e, "worker join failed");
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_empty_root_is_no_files_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let scheduler = Scheduler::new(TargetConfig::default(), WorkerPool::new(2));
        let outcome = scheduler
            .run(dir.path(), &dir.path().join("out"), |_| {})
            .await
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::NoFilesFound));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_same_root_leaves_inputs_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.wav");
        std::fs::write(&clip, b"original bytes").unwrap();

        let scheduler = Scheduler::new(TargetConfig::default(), WorkerPool::new(2));
        let mut seen = Vec::new();
        let outcome = scheduler
            .run(dir.path(), dir.path(), |r| seen.push(r.input.clone()))
            .await
            .unwrap();
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].kind, ErrorKind::Filesystem);
        assert_eq!(seen, vec![clip.clone()]);
        assert_eq!(std::fs::read(&clip).unwrap(), b"original bytes");
    }

    #[tokio::test]
    async fn test_abort_skips_undispatched() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let scheduler = Scheduler::new(TargetConfig::default(), WorkerPool::new(1));
        scheduler.abort_handle().store(true, Ordering::SeqCst);

        let outcome = scheduler
            .run(dir.path(), &dir.path().join("out"), |_| {})
            .await
            .unwrap();
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.completed(), 0);
        assert!(summary.was_aborted());
    }
}
