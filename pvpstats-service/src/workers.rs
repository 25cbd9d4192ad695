//! Background Worker Pool
//!
//! A fixed number of Tokio tasks drain one shared FIFO queue of store-touching
//! jobs. Submission never blocks and works from any thread. Each job returns a
//! [`StatsResult`] that is consumed only for logging: a failing or panicking
//! job is contained and the worker moves on to the next one.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use pvpstats_core::{StatsError, StatsResult};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

struct Job {
    label: &'static str,
    task: BoxFuture<'static, StatsResult<()>>,
}

/// Count of submitted jobs that have not finished yet.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Fixed-size pool of background workers.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current Tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let handles = (0..size)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(job) = next else {
                            break;
                        };
                        run_job(worker, job).await;
                        pending.done();
                    }
                    tracing::debug!(worker, "Stats worker stopped");
                })
            })
            .collect();

        tracing::debug!(size, "Stats worker pool started");
        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            pending,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Queue a job. Fails only after [`WorkerPool::shutdown`].
    pub fn submit<F>(&self, label: &'static str, task: F) -> StatsResult<()>
    where
        F: std::future::Future<Output = StatsResult<()>> + Send + 'static,
    {
        let guard = self.sender.lock().map_err(|_| StatsError::WorkersShutDown)?;
        let Some(sender) = guard.as_ref() else {
            return Err(StatsError::WorkersShutDown);
        };

        self.pending.add();
        let job = Job {
            label,
            task: task.boxed(),
        };
        if sender.send(job).is_err() {
            self.pending.done();
            return Err(StatsError::WorkersShutDown);
        }
        Ok(())
    }

    /// Wait until every job submitted so far has finished.
    pub async fn flush(&self) {
        self.pending.wait_idle().await;
    }

    /// Stop accepting jobs, finish what is queued and join the workers.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Stats worker task failed to join");
            }
        }
        tracing::info!("Stats worker pool shut down");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("pending", &self.pending())
            .finish()
    }
}

async fn run_job(worker: usize, job: Job) {
    let Job { label, task } = job;
    match AssertUnwindSafe(task).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(worker, job = label, error = %e, "Background stats job failed");
        }
        Err(panic) => {
            tracing::error!(
                worker,
                job = label,
                panic = %panic_message(panic.as_ref()),
                "Background stats job panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
