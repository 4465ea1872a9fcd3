//! Ordered durable-write queue.
//!
//! Ledger mutations commit in memory first and enqueue their durable write
//! here; a single worker task drains the queue in FIFO order so records and
//! balance snapshots never land out of order. Backend failures are logged
//! rather than propagated, since the in-memory state they mirror has
//! already committed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::traits::Store;

enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
    Flush(oneshot::Sender<()>),
}

/// Handle to a per-ledger write worker.
///
/// Cloning shares the same worker and ordering domain. The worker exits
/// when the last handle drops.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl WriteQueue {
    /// Spawn the worker task draining onto `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Put { key, value } => {
                        if let Err(error) = store.put(&key, value).await {
                            tracing::error!(key = %key, error = %error, "durable write failed");
                        }
                    }
                    WriteOp::Delete { key } => {
                        if let Err(error) = store.delete(&key).await {
                            tracing::error!(key = %key, error = %error, "durable delete failed");
                        }
                    }
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("write queue worker stopped");
        });

        Self { tx }
    }

    /// Enqueue a write.
    pub fn put(&self, key: impl Into<String>, value: String) {
        let key = key.into();
        if self.tx.send(WriteOp::Put { key, value }).is_err() {
            tracing::warn!("write queue closed, dropping put");
        }
    }

    /// Enqueue a delete.
    pub fn delete(&self, key: impl Into<String>) {
        let key = key.into();
        if self.tx.send(WriteOp::Delete { key }).is_err() {
            tracing::warn!("write queue closed, dropping delete");
        }
    }

    /// Wait until every previously enqueued operation has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
