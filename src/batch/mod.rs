//! Batch scheduling module
//!
//! Applies the transcode engine to every audio file under an input root:
//! - Recursive enumeration and mirrored output paths
//! - A bounded pool of blocking workers
//! - Per-file fault isolation and result aggregation

pub mod pool;
pub mod scanner;
pub mod scheduler;
pub mod summary;

pub use pool::{resolve_worker_count, WorkerPool};
pub use scanner::{scan, ScanResult, Task, AUDIO_EXTENSIONS};
pub use scheduler::Scheduler;
pub use summary::{BatchOutcome, BatchSummary, FailureRecord, Outcome, TaskResult};
