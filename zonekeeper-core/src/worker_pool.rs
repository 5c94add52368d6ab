//! Bounded background worker pool
//!
//! Fire-and-forget work (record pushes, issuance, deployments, batch items)
//! goes through one bounded queue drained by a fixed set of workers, so a burst
//! of requests can never spawn an unbounded number of tasks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::WorkerPoolConfig;
use crate::error::{CoreError, CoreResult};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    name: String,
    task: Task,
}

struct Shared {
    pending: AtomicUsize,
    idle: Notify,
}

/// Cloneable handle; every clone submits to the same queue.
#[derive(Clone)]
pub struct WorkerPool {
    sender: Arc<std::sync::RwLock<Option<mpsc::Sender<Job>>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Start `config.workers` workers. Must be called inside a tokio runtime.
    pub fn new(config: &WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let handles = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    loop {
                        // 只在取任务时持锁
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };

                        log::debug!("Worker {worker} running task '{}'", job.name);
                        if AssertUnwindSafe(job.task).catch_unwind().await.is_err() {
                            log::error!("Worker task '{}' panicked", job.name);
                        }

                        if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                            shared.idle.notify_waiters();
                        }
                    }
                    log::debug!("Worker {worker} stopped");
                })
            })
            .collect();

        Self {
            sender: Arc::new(std::sync::RwLock::new(Some(tx))),
            handles: Arc::new(Mutex::new(handles)),
            shared,
        }
    }

    /// Queue a task without waiting.
    ///
    /// # Errors
    /// * `QueueFull` - the queue is at capacity
    /// * `PoolClosed` - [`shutdown`](Self::shutdown) was called
    pub fn submit<F>(&self, name: impl Into<String>, task: F) -> CoreResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let sender = self
            .sender
            .read()
            .map_err(|_| CoreError::PoolClosed)?
            .clone()
            .ok_or(CoreError::PoolClosed)?;

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            name,
            task: Box::pin(task),
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.release_slot();
                match err {
                    mpsc::error::TrySendError::Full(job) => {
                        log::warn!("Worker queue full, rejected task '{}'", job.name);
                        Err(CoreError::QueueFull)
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(CoreError::PoolClosed),
                }
            }
        }
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until every submitted task has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close the queue and wait for queued and in-flight tasks.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Worker join failed: {e}");
            }
        }
    }

    fn release_slot(&self) {
        if self.shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}
