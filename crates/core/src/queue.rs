use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::errors::DeliveryError;

type JobFuture = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'static>>;

struct QueuedJob {
    name: &'static str,
    future: JobFuture,
}

#[derive(Default)]
struct PendingJobs {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingJobs {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Detached, best-effort job runner.
///
/// Submitted jobs run after the submitter has moved on. Nobody joins them,
/// nothing cancels them and failures are only logged. `wait_idle` exists for
/// shutdown and tests, not for request handling.
#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    pending: Arc<PendingJobs>,
}

impl BackgroundQueue {
    /// Starts the dispatcher task. Must be called inside a tokio runtime.
    pub fn start() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedJob>();
        let pending = Arc::new(PendingJobs::default());
        let worker_pending = Arc::clone(&pending);

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let pending = Arc::clone(&worker_pending);
                tokio::spawn(async move {
                    match job.future.await {
                        Ok(()) => debug!(event_name = "queue.job.completed", job = job.name),
                        Err(error) => warn!(
                            event_name = "queue.job.failed",
                            job = job.name,
                            error = %error,
                            "background job failed"
                        ),
                    }
                    pending.finish();
                });
            }
        });

        Self { sender, pending }
    }

    /// Hands `job` to the dispatcher. Returns false when the dispatcher is gone
    /// and the job was dropped.
    pub fn submit<F>(&self, name: &'static str, job: F) -> bool
    where
        F: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedJob { name, future: Box::pin(job) };
        if self.sender.send(queued).is_err() {
            warn!(event_name = "queue.job.dropped", job = name, "background queue is closed");
            self.pending.finish();
            return false;
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
