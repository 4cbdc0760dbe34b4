//! The shared worker pool acceptors dispatch inbound requests onto.
//!
//! Mirrors a `ThreadPoolExecutor`-style core/max/keep-alive shape: `core`
//! workers are always alive; additional workers beyond `core`, up to
//! `max`, are spawned on demand when no worker is currently idle, and
//! exit once they've sat idle for [`IDLE_EVICTION`]. Submitted work is
//! queued on an unbounded channel, which is the pool's "unbounded FIFO
//! queue".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// How long a worker beyond `core` waits for new work before exiting.
const IDLE_EVICTION: Duration = Duration::from_secs(60);

struct Shared {
    sender: mpsc::UnboundedSender<Task>,
    receiver: Mutex<mpsc::UnboundedReceiver<Task>>,
    max: usize,
    live_workers: AtomicUsize,
    idle_workers: AtomicUsize,
}

/// A bounded-concurrency dispatch pool for acceptor-side servlet calls.
#[derive(Clone)]
pub struct WorkerPool(Arc<Shared>);

impl WorkerPool {
    /// Builds a pool with a floor of `available_parallelism` permanent
    /// workers and a ceiling of `4 * available_parallelism` (falling back
    /// to a floor of 1 if the host cannot report its parallelism).
    pub fn new() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_bounds(parallelism, parallelism * 4)
    }

    /// Builds a pool with a floor of 1 permanent worker and an explicit
    /// ceiling. Mainly useful in tests, where a small, deterministic bound
    /// is easier to reason about.
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self::with_bounds(1, max_concurrency.max(1))
    }

    fn with_bounds(core: usize, max: usize) -> Self {
        let core = core.max(1);
        let max = max.max(core);
        let (sender, receiver) = mpsc::unbounded_channel();
        let pool = Self(Arc::new(Shared {
            sender,
            receiver: Mutex::new(receiver),
            max,
            live_workers: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
        }));
        for _ in 0..core {
            pool.spawn_worker(true);
        }
        pool
    }

    /// Submits `task` for execution. Returns immediately; `task` runs on
    /// whichever worker picks it up next. If no worker is currently idle
    /// and the pool has room under its ceiling, a new worker is spawned to
    /// take it.
    pub(crate) fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.0.sender.send(Box::pin(task));
        if self.0.idle_workers.load(Ordering::SeqCst) == 0 && self.0.live_workers.load(Ordering::SeqCst) < self.0.max {
            self.spawn_worker(false);
        }
    }

    fn spawn_worker(&self, core: bool) {
        let shared = Arc::clone(&self.0);
        shared.live_workers.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                shared.idle_workers.fetch_add(1, Ordering::SeqCst);
                let next = {
                    let mut rx = shared.receiver.lock().await;
                    if core {
                        rx.recv().await
                    } else {
                        match tokio::time::timeout(IDLE_EVICTION, rx.recv()).await {
                            Ok(next) => next,
                            Err(_elapsed) => None,
                        }
                    }
                };
                shared.idle_workers.fetch_sub(1, Ordering::SeqCst);
                match next {
                    Some(task) => task.await,
                    None => break,
                }
            }
            shared.live_workers.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize as TestCounter, Ordering as TestOrdering};

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let pool = WorkerPool::with_max_concurrency(2);
        let counter = Arc::new(TestCounter::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.submit(async move {
                counter.fetch_add(1, TestOrdering::SeqCst);
            });
        }
        // Give the spawned tasks a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counter.load(TestOrdering::SeqCst), 5);
    }

    #[tokio::test]
    async fn grows_beyond_the_floor_when_work_is_concurrent() {
        let pool = WorkerPool::with_bounds(1, 3);
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        for _ in 0..3 {
            let tx = tx.clone();
            pool.submit(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                let _ = tx.send(());
            });
        }
        for _ in 0..3 {
            assert!(
                tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
                    .await
                    .expect("all three run concurrently, not queued behind one worker")
                    .is_some()
            );
        }
    }
}
