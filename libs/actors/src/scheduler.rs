//! Scheduler
//!
//! A fixed pool of worker tasks pulls runnable cells from one shared run
//! queue. A cell enters the queue only through its own `scheduled` flag, so it
//! is never held by two workers at once.
//!
//! Behaviors waiting on an async result are parked in a `JoinSet` outside the
//! pool, so a waiting actor never holds a worker.

use crate::{ActorError, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

/// Something a worker can drive for one turn
pub(crate) trait Runnable: Send + Sync + 'static {
    /// Process up to `throughput` messages, then yield the worker
    fn run_turn(self: Arc<Self>, throughput: usize) -> BoxFuture<'static, ()>;
}

type RunQueue = Arc<Mutex<mpsc::UnboundedReceiver<Arc<dyn Runnable>>>>;

/// Handle used by cells to get themselves scheduled
#[derive(Clone)]
pub(crate) struct Scheduler {
    run_queue: mpsc::UnboundedSender<Arc<dyn Runnable>>,
    shutdown: Arc<watch::Sender<bool>>,
    closed: Arc<AtomicBool>,
    runtime: Handle,
    /// Parked behaviors; taken by `join_suspended`
    suspended: Arc<parking_lot::Mutex<Option<JoinSet<()>>>>,
}

/// Join handles of the worker tasks
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn `workers` worker tasks on the given runtime
    pub(crate) fn start(runtime: &Handle, workers: usize, throughput: usize) -> (Self, WorkerPool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue: RunQueue = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                runtime.spawn(worker_loop(
                    worker_id,
                    Arc::clone(&queue),
                    shutdown_rx.clone(),
                    throughput,
                ))
            })
            .collect();

        debug!(workers, throughput, "Scheduler started");

        let scheduler = Self {
            run_queue: tx,
            shutdown: Arc::new(shutdown_tx),
            closed: Arc::new(AtomicBool::new(false)),
            runtime: runtime.clone(),
            suspended: Arc::new(parking_lot::Mutex::new(Some(JoinSet::new()))),
        };
        (scheduler, WorkerPool { handles })
    }

    /// Queue a runnable cell. Callers guarantee it is not already queued.
    pub(crate) fn schedule(&self, runnable: Arc<dyn Runnable>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ActorError::system("Scheduler is shut down"));
        }
        self.run_queue
            .send(runnable)
            .map_err(|_| ActorError::system("Scheduler run queue closed"))
    }

    /// Drive a pending behavior to completion outside the worker pool
    pub(crate) fn spawn_suspended(&self, task: BoxFuture<'static, ()>) -> Result<()> {
        let mut suspended = self.suspended.lock();
        let Some(set) = suspended.as_mut() else {
            return Err(ActorError::system("Scheduler no longer accepts parked behaviors"));
        };

        while set.try_join_next().is_some() {}
        set.spawn_on(task, &self.runtime);
        Ok(())
    }

    /// Wait for parked behaviors, aborting any still running after `timeout`
    pub(crate) async fn join_suspended(&self, timeout: Duration) {
        let Some(mut set) = self.suspended.lock().take() else {
            return;
        };
        if set.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(timeout, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = set.len(),
                "Parked behaviors did not settle within {:?}, aborting", timeout
            );
            set.abort_all();
        }
    }

    /// Signal every worker to exit after its current turn
    pub(crate) fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.send_replace(true);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: RunQueue,
    mut shutdown: watch::Receiver<bool>,
    throughput: usize,
) {
    trace!(worker_id, "Worker started");
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;

                _ = shutdown.wait_for(|stop| *stop) => None,
                runnable = rx.recv() => runnable,
            }
        };

        match next {
            Some(runnable) => runnable.run_turn(throughput).await,
            None => break,
        }
    }
    trace!(worker_id, "Worker exited");
}

impl WorkerPool {
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait for workers to finish, aborting any still running after `timeout`
    pub(crate) async fn join(self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in self.handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!("Worker finished with error: {}", e),
                Err(_) => {
                    warn!("Worker did not exit within {:?}, aborting", timeout);
                    abort.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        turns: AtomicUsize,
    }

    impl Runnable for CountingTask {
        fn run_turn(self: Arc<Self>, _throughput: usize) -> BoxFuture<'static, ()> {
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                self.turns.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    fn counting_task() -> Arc<CountingTask> {
        Arc::new(CountingTask {
            turns: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_workers_drive_scheduled_tasks() {
        let (scheduler, pool) = Scheduler::start(&Handle::current(), 4, 8);
        assert_eq!(pool.len(), 4);

        let tasks: Vec<_> = (0..10).map(|_| counting_task()).collect();
        for task in &tasks {
            scheduler.schedule(Arc::clone(task) as Arc<dyn Runnable>).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while tasks.iter().any(|t| t.turns.load(Ordering::SeqCst) == 0) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        scheduler.shutdown();
        pool.join(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_schedule_after_shutdown_fails() {
        let (scheduler, pool) = Scheduler::start(&Handle::current(), 1, 1);
        scheduler.shutdown();
        pool.join(Duration::from_secs(1)).await;

        assert!(scheduler.is_shut_down());
        let err = scheduler
            .schedule(counting_task() as Arc<dyn Runnable>)
            .unwrap_err();
        assert_eq!(err.category(), "system");
    }

    #[tokio::test]
    async fn test_parked_tasks_do_not_hold_workers() {
        let (scheduler, pool) = Scheduler::start(&Handle::current(), 1, 1);
        let gate = Arc::new(tokio::sync::Notify::new());

        let waiting = Arc::clone(&gate);
        scheduler
            .spawn_suspended(async move { waiting.notified().await }.boxed())
            .unwrap();

        // The single worker is still free for runnable cells.
        let task = counting_task();
        scheduler.schedule(Arc::clone(&task) as Arc<dyn Runnable>).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while task.turns.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        gate.notify_one();
        scheduler.shutdown();
        pool.join(Duration::from_secs(1)).await;
        scheduler.join_suspended(Duration::from_secs(1)).await;

        let err = scheduler
            .spawn_suspended(async {}.boxed())
            .unwrap_err();
        assert_eq!(err.category(), "system");
    }
}
