//! Per-task results and the batch summary
//!
//! Every dispatched task reports exactly one [`TaskResult`]; the scheduler
//! folds them into a [`BatchSummary`], which can also be written out as a JSON
//! run report.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorKind, PrepError, Result};
use crate::transcode::TranscodeReport;

/// How one task ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        output_samples: u64,
        padded_samples: u64,
        truncated: bool,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

/// The single result a task reports back to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

impl TaskResult {
    pub fn success(input: PathBuf, output: PathBuf, report: &TranscodeReport) -> Self {
        Self {
            input,
            output,
            outcome: Outcome::Success {
                output_samples: report.output_samples,
                padded_samples: report.padded_samples,
                truncated: report.truncated,
            },
            elapsed_ms: report.elapsed.as_millis() as u64,
        }
    }

    pub fn failure(input: PathBuf, output: PathBuf, error: &PrepError, elapsed_ms: u64) -> Self {
        Self::failure_with(input, output, error.kind(), error.to_string(), elapsed_ms)
    }

    pub fn failure_with(
        input: PathBuf,
        output: PathBuf,
        kind: ErrorKind,
        message: String,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            input,
            output,
            outcome: Outcome::Failure { kind, message },
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }
}

/// One failed input, as listed in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub input: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Eligible input files discovered
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks never dispatched because the run was aborted
    pub skipped: usize,
    pub workers: usize,
    /// Failed inputs, sorted by path
    pub failures: Vec<FailureRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn new(discovered: usize, workers: usize) -> Self {
        let now = Utc::now();
        Self {
            discovered,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            workers,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Fold one task result into the tally.
    pub fn record(&mut self, result: &TaskResult) {
        match &result.outcome {
            Outcome::Success { .. } => self.succeeded += 1,
            Outcome::Failure { kind, message } => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    input: result.input.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
    }

    /// Close the summary once every dispatched task has reported.
    pub fn finish(&mut self) {
        self.failures.sort_by(|a, b| a.input.cmp(&b.input));
        self.finished_at = Utc::now();
    }

    /// Number of tasks that reported a result.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn was_aborted(&self) -> bool {
        self.skipped > 0
    }

    /// The final user-facing tally line.
    pub fn summary_line(&self) -> String {
        format!(
            "Processing complete! {} succeeded, {} failed",
            self.succeeded, self.failed
        )
    }

    /// Write this summary as pretty JSON to `path`.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PrepError::filesystem(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PrepError::Config(format!("failed to serialize report: {}", e)))?;
        std::fs::write(path, json).map_err(|e| PrepError::filesystem(path, e))?;
        Ok(())
    }
}

/// What a batch run produced.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// The input root held no eligible files; nothing was run
    NoFilesFound,
    Completed(BatchSummary),
}

impl BatchOutcome {
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            BatchOutcome::NoFilesFound => None,
            BatchOutcome::Completed(summary) => Some(summary),
        }
    }

    /// The final tally line; a run with no files reports zero of each.
    pub fn summary_line(&self) -> String {
        match self {
            BatchOutcome::NoFilesFound => BatchSummary::new(0, 0).summary_line(),
            BatchOutcome::Completed(summary) => summary.summary_line(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(path: &str) -> TaskResult {
        TaskResult::failure_with(
            PathBuf::from(path),
            PathBuf::from("/out/x.wav"),
            ErrorKind::Decode,
            "No decodable audio data".into(),
            3,
        )
    }

    fn succeeded(path: &str) -> TaskResult {
        TaskResult {
            input: PathBuf::from(path),
            output: PathBuf::from("/out/x.wav"),
            outcome: Outcome::Success {
                output_samples: 48000,
                padded_samples: 0,
                truncated: false,
            },
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_record_and_summary_line() {
        let mut summary = BatchSummary::new(3, 2);
        summary.record(&succeeded("/in/a.mp3"));
        summary.record(&failed("/in/c.mp3"));
        summary.record(&failed("/in/b.mp3"));
        summary.finish();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.completed(), 3);
        assert_eq!(summary.summary_line(), "Processing complete! 1 succeeded, 2 failed");
        assert_eq!(summary.failures[0].input, PathBuf::from("/in/b.mp3"));
        assert!(!summary.was_aborted());
    }

    #[test]
    fn test_write_report() {
        let mut summary = BatchSummary::new(1, 1);
        summary.record(&failed("/in/a.mp3"));
        summary.finish();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/run.json");
        summary.write_report(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["failures"][0]["kind"], "decode");
        assert_eq!(value["failures"][0]["input"], "/in/a.mp3");
        assert!(value["started_at"].is_string());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(succeeded("/in/a.mp3")).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
        assert_eq!(json["outcome"]["output_samples"], 48000);
    }

    #[test]
    fn test_no_files_found_has_no_summary() {
        assert!(BatchOutcome::NoFilesFound.summary().is_none());
        assert_eq!(
            BatchOutcome::NoFilesFound.summary_line(),
            "Processing complete! 0 succeeded, 0 failed"
        );
    }
}
