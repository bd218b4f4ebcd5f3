//! Bounded worker pool
//!
//! FFmpeg work is blocking, so each task runs on tokio's blocking thread pool.
//! A semaphore caps how many run at once.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::error::{PrepError, Result};

/// Resolve a requested worker count; zero or negative means available
/// parallelism. Never returns less than one.
pub fn resolve_worker_count(requested: i64) -> usize {
    if requested > 0 {
        return usize::try_from(requested).unwrap_or(usize::MAX);
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

/// An explicitly sized pool of blocking workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Number of tasks that may run concurrently.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free worker slot.
    pub fn acquire(&self) -> impl Future<Output = Result<OwnedSemaphorePermit>> + 'static {
        let permits = self.permits.clone();
        async move {
            permits
                .acquire_owned()
                .await
                .map_err(|e| PrepError::Worker(format!("worker pool closed: {}", e)))
        }
    }

    /// Run `job` on a blocking thread, holding `permit` until it returns.
    pub fn spawn<T, F>(&self, tasks: &mut JoinSet<T>, permit: OwnedSemaphorePermit, job: F)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        tasks.spawn_blocking(move || {
            let _permit = permit;
            job()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_resolve_worker_count() {
        assert_eq!(resolve_worker_count(4), 4);
        assert_eq!(resolve_worker_count(1), 1);
        assert!(resolve_worker_count(0) >= 1);
        assert!(resolve_worker_count(-3) >= 1);
    }

    #[test]
    fn test_pool_size_clamped() {
        assert_eq!(WorkerPool::new(0).size(), 1);
        assert_eq!(WorkerPool::new(8).size(), 8);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for _ in 0..8 {
            let permit = pool.acquire().await.unwrap();
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(&mut tasks, permit, move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
