//! Job Dispatcher
//!
//! Two execution contexts:
//! - immediate: a fixed pool of workers sharing one unbounded FIFO backlog
//! - queued: a single worker with its own unbounded FIFO backlog, so queued
//!   jobs never overlap and run in submission order
//!
//! The queued worker publishes the running job on a single-slot watch
//! channel. Shutdown aborts every worker without draining.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_shared::{JobName, JobType};

use super::{Job, JobContext};

type Backlog = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>;

pub struct Dispatcher {
    immediate_tx: mpsc::UnboundedSender<Job>,
    queued_tx: mpsc::UnboundedSender<Job>,
    current: watch::Receiver<Option<JobName>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn `pool_size` immediate workers and the queued worker
    pub fn start(ctx: Arc<JobContext>, pool_size: usize) -> Self {
        let (immediate_tx, immediate_rx) = mpsc::unbounded_channel();
        let (queued_tx, mut queued_rx) = mpsc::unbounded_channel::<Job>();
        let (current_tx, current) = watch::channel(None);

        let backlog: Backlog = Arc::new(tokio::sync::Mutex::new(immediate_rx));
        let mut workers = Vec::with_capacity(pool_size + 1);

        for id in 0..pool_size.max(1) {
            let backlog = backlog.clone();
            let ctx = ctx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    // Release the backlog before running so other workers can pull
                    let next = backlog.lock().await.recv().await;
                    let Some(job) = next else { break };
                    run_contained(job, &ctx).await;
                }
                info!("[JOB] Immediate worker {} exited", id);
            }));
        }

        let queued_ctx = ctx.clone();
        workers.push(tokio::spawn(async move {
            while let Some(job) = queued_rx.recv().await {
                let _current = CurrentJob::begin(&current_tx, job.name());
                run_contained(job, &queued_ctx).await;
            }
            info!("[JOB] Queued worker exited");
        }));

        info!("[JOB] Dispatcher started: {} immediate workers, 1 queued worker", pool_size.max(1));

        Self {
            immediate_tx,
            queued_tx,
            current,
            workers: Mutex::new(workers),
        }
    }

    /// Route a job to the context its type requires
    pub fn submit(&self, job: Job) {
        match job.job_type() {
            JobType::Immediate => self.submit_immediate(job),
            JobType::Queued => self.submit_queued(job),
        }
    }

    pub fn submit_immediate(&self, job: Job) {
        let name = job.name();
        if self.immediate_tx.send(job).is_err() {
            warn!("[JOB] Dispatcher stopped, dropping {}", name);
        }
    }

    pub fn submit_queued(&self, job: Job) {
        let name = job.name();
        if self.queued_tx.send(job).is_err() {
            warn!("[JOB] Dispatcher stopped, dropping {}", name);
        }
    }

    /// The queued job currently running, if any
    pub fn current_job(&self) -> Option<JobName> {
        *self.current.borrow()
    }

    /// Interrupt both contexts immediately, abandoning in-flight work
    pub fn shutdown(&self) {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in &workers {
            worker.abort();
        }
        info!("[JOB] Dispatcher shut down, {} workers aborted", workers.len());
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Publishes the running queued job for its lifetime
struct CurrentJob<'a> {
    tx: &'a watch::Sender<Option<JobName>>,
}

impl<'a> CurrentJob<'a> {
    fn begin(tx: &'a watch::Sender<Option<JobName>>, name: JobName) -> Self {
        tx.send_replace(Some(name));
        Self { tx }
    }
}

impl Drop for CurrentJob<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(None);
    }
}

/// Run a job, keeping the worker alive if the body panics
async fn run_contained(mut job: Job, ctx: &JobContext) {
    let name = job.name();
    if AssertUnwindSafe(job.run(ctx)).catch_unwind().await.is_err() {
        error!("[JOB] {} panicked", name);
    }
}
