//! Bounded worker pools.
//!
//! A [`WorkerPool`] runs jobs on the tokio runtime with at most `size` of
//! them in flight at once. Results come back in completion order, not
//! submission order.
//!
//! Pools are plain values: build them once at startup (see [`Pools`]),
//! clone the handle into whatever needs it, and shut them down before exit.
//! A pool that has been shut down stays closed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("{0} pool is shut down")]
    Closed(&'static str),
    #[error("job cancelled before it started")]
    Cancelled,
    #[error("job panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Default)]
struct PoolState {
    closed: AtomicBool,
    /// Jobs submitted and not yet finished, queued ones included.
    pending: AtomicUsize,
    drained: Notify,
}

/// Decrements the pending count when a job ends, however it ends.
struct PendingGuard(Arc<PoolState>);

impl PendingGuard {
    fn new(state: Arc<PoolState>) -> Self {
        state.pending.fetch_add(1, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Handle to a bounded pool. Clones share the same permits and state.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    permits: Arc<Semaphore>,
    state: Arc<PoolState>,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name,
            size,
            permits: Arc::new(Semaphore::new(size)),
            state: Arc::new(PoolState::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Jobs currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        if self.permits.is_closed() {
            return 0;
        }
        self.size - self.permits.available_permits()
    }

    /// Run `job` on every item and collect the results as they complete.
    ///
    /// Each entry pairs the item's position in `items` with the job's
    /// output, or with a [`PoolError`] if the job was cancelled by a
    /// shutdown before it started or panicked.
    ///
    /// # Errors
    ///
    /// [`PoolError::Closed`] if the pool has already been shut down.
    pub async fn map_unordered<I, T, F, Fut, R>(
        &self,
        items: I,
        job: F,
    ) -> Result<Vec<(usize, Result<R, PoolError>)>, PoolError>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed(self.name));
        }

        let job = Arc::new(job);
        let mut set = JoinSet::new();
        for (position, item) in items.into_iter().enumerate() {
            let permits = self.permits.clone();
            let guard = PendingGuard::new(self.state.clone());
            let job = job.clone();
            set.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (position, Err(PoolError::Cancelled));
                };
                // The job runs in its own task so a panic keeps its position.
                let result = tokio::spawn(job(item))
                    .await
                    .map_err(|e| PoolError::Panicked(e.to_string()));
                (position, result)
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                // Wrapper tasks only await; they fail only if the runtime aborts them.
                Err(e) => warn!(pool = self.name, "worker task lost: {}", e),
            }
        }
        Ok(results)
    }

    /// Close the pool.
    ///
    /// New batches are refused from now on. With `cancel_pending`, queued
    /// jobs that have not started resolve as [`PoolError::Cancelled`];
    /// otherwise they still run. With `wait`, the call returns once every
    /// remaining job has finished.
    pub async fn shutdown(&self, wait: bool, cancel_pending: bool) {
        info!(pool = self.name, wait, cancel_pending, "shutdown called");
        self.state.closed.store(true, Ordering::SeqCst);

        if cancel_pending {
            self.permits.close();
        }

        if wait {
            loop {
                let drained = self.state.drained.notified();
                let pending = self.state.pending.load(Ordering::SeqCst);
                if pending == 0 {
                    break;
                }
                debug!(pool = self.name, pending, "waiting for jobs to finish");
                drained.await;
            }
            self.permits.close();
        }

        info!(pool = self.name, "shutdown completed");
    }
}

/// The two pools the pipeline runs on.
#[derive(Debug, Clone)]
pub struct Pools {
    /// File-level fan-out.
    pub files: WorkerPool,
    /// Chunk-level fan-out inside the dispatcher.
    pub chunks: WorkerPool,
}

impl Pools {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            files: WorkerPool::new("file", config.file_multiplicity),
            chunks: WorkerPool::new("chunk", config.chunk_multiplicity),
        }
    }

    pub async fn shutdown(&self, wait: bool, cancel_pending: bool) {
        self.files.shutdown(wait, cancel_pending).await;
        self.chunks.shutdown(wait, cancel_pending).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_every_item() {
        let pool = WorkerPool::new("test", 3);
        let results = pool
            .map_unordered(0..10u32, |n| async move { n * 2 })
            .await
            .unwrap();
        let mut values: Vec<u32> = results.into_iter().map(|(_, r)| r.unwrap()).collect();
        values.sort();
        assert_eq!(values, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = WorkerPool::new("test", 2);
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (l, p) = (live.clone(), peak.clone());
        pool.map_unordered(0..8, move |_| {
            let live = l.clone();
            let peak = p.clone();
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                live.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let pool = WorkerPool::new("test", 2);
        let results = pool
            .map_unordered(vec![60u64, 5], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await
            .unwrap();
        let order: Vec<(usize, u64)> = results.into_iter().map(|(i, r)| (i, r.unwrap())).collect();
        assert_eq!(order, vec![(1, 5), (0, 60)]);
    }

    #[tokio::test]
    async fn closed_pool_rejects_work() {
        let pool = WorkerPool::new("test", 1);
        pool.shutdown(true, false).await;
        assert!(pool.is_closed());
        let err = pool
            .map_unordered(0..1, |n: i32| async move { n })
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::Closed("test"));
    }

    #[tokio::test]
    async fn cancel_pending_skips_queued_jobs() {
        let pool = WorkerPool::new("test", 1);
        let runner = pool.clone();
        let batch = tokio::spawn(async move {
            runner
                .map_unordered(0..4, |_| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown(true, true).await;

        let results = batch.await.unwrap().unwrap();
        assert_eq!(results.len(), 4);
        let cancelled = results
            .iter()
            .filter(|(_, r)| matches!(r, Err(PoolError::Cancelled)))
            .count();
        assert_eq!(cancelled, 3);
    }

    #[tokio::test]
    async fn shutdown_without_flags_lets_queued_jobs_run() {
        let pool = WorkerPool::new("test", 1);
        let runner = pool.clone();
        let batch = tokio::spawn(async move {
            runner
                .map_unordered(0..4, |_| async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.shutdown(false, false).await;
        assert!(pool.is_closed());
        assert!(pool
            .map_unordered(0..1, |n: i32| async move { n })
            .await
            .is_err());

        let results = batch.await.unwrap().unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn panicking_job_keeps_its_position() {
        let pool = WorkerPool::new("test", 2);
        let mut results = pool
            .map_unordered(0..3u32, |n| async move {
                if n == 1 {
                    panic!("bad item");
                }
                n
            })
            .await
            .unwrap();
        results.sort_by_key(|(i, _)| *i);

        assert_eq!(results[0].1, Ok(0));
        assert!(matches!(results[1], (1, Err(PoolError::Panicked(_)))));
        assert_eq!(results[2].1, Ok(2));
    }

    #[tokio::test]
    async fn wait_drains_queued_jobs() {
        let pool = WorkerPool::new("test", 1);
        let done = Arc::new(AtomicUsize::new(0));
        let runner = pool.clone();
        let counter = done.clone();
        let batch = tokio::spawn(async move {
            runner
                .map_unordered(0..3, move |_| {
                    let counter = counter.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.shutdown(true, false).await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(batch.await.unwrap().unwrap().iter().all(|(_, r)| r.is_ok()));
    }
}
