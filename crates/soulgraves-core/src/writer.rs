//! Ordered background storage.
//!
//! The engine never awaits storage during a tick. Every operation is queued
//! here and run by one background task, one at a time, in submission order:
//! a soul's row is always saved before it is updated or deleted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::store::SoulBackend;

type StorageOp = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO queue of storage operations drained by a single task.
pub struct StorageWriter {
    backend: Arc<dyn SoulBackend>,
    queue: mpsc::UnboundedSender<StorageOp>,
    idle: Option<mpsc::UnboundedReceiver<StorageOp>>,
    worker: Option<JoinHandle<()>>,
    submitted: u64,
}

impl StorageWriter {
    /// Create a writer. The draining task starts on first use.
    pub fn new(backend: Arc<dyn SoulBackend>) -> Self {
        let (queue, idle) = mpsc::unbounded_channel();
        Self {
            backend,
            queue,
            idle: Some(idle),
            worker: None,
            submitted: 0,
        }
    }

    /// Operations submitted so far.
    pub const fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Queue `op` behind everything already submitted.
    pub fn submit<F, Fut>(&mut self, op: F)
    where
        F: FnOnce(Arc<dyn SoulBackend>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_worker();
        self.submitted = self.submitted.saturating_add(1);
        if self.queue.send(Box::pin(op(Arc::clone(&self.backend)))).is_err() {
            error!("storage writer stopped, operation dropped");
        }
    }

    /// Wait until every operation submitted so far has finished.
    pub async fn flush(&mut self) {
        if self.worker.is_none() {
            return;
        }
        let (done, finished) = oneshot::channel();
        self.submit(move |_| async move {
            if done.send(()).is_err() {
                debug!("flush waiter went away");
            }
        });
        if finished.await.is_err() {
            error!("storage writer stopped before flush completed");
        }
    }

    fn ensure_worker(&mut self) {
        if let Some(mut ops) = self.idle.take() {
            self.worker = Some(tokio::spawn(async move {
                while let Some(op) = ops.recv().await {
                    op.await;
                }
                debug!("storage writer drained");
            }));
        }
    }
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter")
            .field("submitted", &self.submitted)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::memory_backend::MemoryBackend;

    #[tokio::test]
    async fn operations_finish_in_submission_order() {
        let mut writer = StorageWriter::new(Arc::new(MemoryBackend::new()));
        let log = Arc::new(Mutex::new(Vec::new()));

        for (step, delay_ms) in [(1_u8, 30_u64), (2, 0), (3, 10)] {
            let log = Arc::clone(&log);
            writer.submit(move |_| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().unwrap().push(step);
            });
        }
        writer.flush().await;

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(writer.submitted(), 4);
    }

    #[tokio::test]
    async fn flush_without_work_returns_immediately() {
        let mut writer = StorageWriter::new(Arc::new(MemoryBackend::new()));
        writer.flush().await;
        assert_eq!(writer.submitted(), 0);
    }
}
