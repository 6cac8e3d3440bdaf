//! Background Cascade Processor
//!
//! Runs cascade jobs produced by page saves on a single background task:
//! - Saves enqueue a job and return immediately
//! - Jobs run one after another in enqueue order
//! - Each job's completion is observable through a [`CascadeHandle`]
//! - Graceful shutdown drains every job already queued
//!
//! ## Queue Model
//!
//! The queue is a bounded `tokio::sync::mpsc` channel. When it is full,
//! `enqueue` waits for room, which slows savers down instead of dropping
//! cascades. A cascade's result is sent back on a `oneshot` channel; callers
//! that do not care simply drop the handle.

use crate::config::TreeConfig;
use crate::services::error::TreeServiceError;
use crate::services::tree_engine::{CascadeJob, CascadeReport, TreeEngine};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Completion handle for one enqueued cascade
///
/// Dropping it does not cancel the cascade.
#[derive(Debug)]
pub struct CascadeHandle {
    node_id: String,
    done_rx: oneshot::Receiver<CascadeReport>,
}

impl CascadeHandle {
    /// Node whose save triggered the cascade
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Wait until the cascade has been applied
    ///
    /// Fails with `CascadeUnavailable` if the processor stopped before
    /// running the job.
    pub async fn wait(self) -> Result<CascadeReport, TreeServiceError> {
        self.done_rx
            .await
            .map_err(|_| TreeServiceError::CascadeUnavailable)
    }
}

struct QueuedCascade {
    job: CascadeJob,
    done_tx: oneshot::Sender<CascadeReport>,
}

/// Cloneable sender side of the cascade queue
///
/// Lightweight handle passed to services that save pages.
#[derive(Clone)]
pub struct CascadeQueue {
    job_tx: mpsc::Sender<QueuedCascade>,
}

impl CascadeQueue {
    /// Queue a cascade job
    ///
    /// Waits while the queue is full. Fails with `CascadeUnavailable` once
    /// the processor has shut down.
    pub async fn enqueue(&self, job: CascadeJob) -> Result<CascadeHandle, TreeServiceError> {
        let (done_tx, done_rx) = oneshot::channel();
        let node_id = job.node_id.clone();

        self.job_tx
            .send(QueuedCascade { job, done_tx })
            .await
            .map_err(|_| {
                tracing::warn!("CascadeProcessor has shut down, cascade for {} dropped", node_id);
                TreeServiceError::CascadeUnavailable
            })?;

        tracing::debug!("Queued cascade for {}", node_id);
        Ok(CascadeHandle { node_id, done_rx })
    }
}

/// Single-worker cascade processor
pub struct CascadeProcessor {
    queue: CascadeQueue,
    shutdown_tx: mpsc::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CascadeProcessor {
    /// Create the processor and spawn its background task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(engine: Arc<TreeEngine>, config: &TreeConfig) -> Self {
        let capacity = config.cascade_queue_capacity.max(1);
        tracing::info!("CascadeProcessor starting (queue capacity {})", capacity);

        let (job_tx, mut job_rx) = mpsc::channel::<QueuedCascade>(capacity);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased; // Check shutdown first

                    _ = shutdown_rx.recv() => {
                        // Stop accepting jobs, then finish the ones already queued
                        job_rx.close();
                        let mut drained = 0;
                        while let Some(queued) = job_rx.recv().await {
                            Self::process(&engine, queued).await;
                            drained += 1;
                        }
                        tracing::info!("CascadeProcessor shutting down ({} queued cascades drained)", drained);
                        break;
                    }

                    queued = job_rx.recv() => {
                        match queued {
                            Some(queued) => Self::process(&engine, queued).await,
                            None => {
                                tracing::debug!("CascadeProcessor queue closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            queue: CascadeQueue { job_tx },
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    async fn process(engine: &TreeEngine, queued: QueuedCascade) {
        let report = engine.run_cascade(&queued.job).await;
        // Receiver dropped means nobody is waiting
        let _ = queued.done_tx.send(report);
    }

    /// Get a cloneable queue handle
    pub fn queue(&self) -> CascadeQueue {
        self.queue.clone()
    }

    /// Queue a cascade job (see [`CascadeQueue::enqueue`])
    pub async fn enqueue(&self, job: CascadeJob) -> Result<CascadeHandle, TreeServiceError> {
        self.queue.enqueue(job).await
    }

    /// Shutdown processor gracefully
    ///
    /// Closes the queue, waits for every queued cascade to finish, then
    /// returns. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), TreeServiceError> {
        let task = match self.task.lock().await.take() {
            Some(task) => task,
            None => return Ok(()),
        };

        tracing::info!("Shutting down CascadeProcessor");
        // A full channel means a shutdown signal is already pending
        let _ = self.shutdown_tx.try_send(());

        if let Err(e) = task.await {
            tracing::error!("CascadeProcessor task ended abnormally: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NodeStore};
    use crate::models::{Node, NodeKind};
    use crate::services::HierarchyQueryService;
    use std::time::Duration;

    fn page(id: &str, parent: &str) -> Node {
        Node::new_with_id(
            id.to_string(),
            NodeKind::Page,
            id.to_string(),
            Some(parent.to_string()),
        )
        .published(true)
    }

    fn processor_over(store: Arc<MemoryStore>) -> CascadeProcessor {
        let config = TreeConfig::default();
        let engine = Arc::new(TreeEngine::new(HierarchyQueryService::new(store, &config)));
        CascadeProcessor::new(engine, &config)
    }

    fn unpublish(node_id: &str) -> CascadeJob {
        CascadeJob {
            node_id: node_id.to_string(),
            rewrite_paths: false,
            unpublish: true,
        }
    }

    #[tokio::test]
    async fn test_handle_reports_completion() {
        let store = Arc::new(
            MemoryStore::new()
                .with_node(page("a", "root"))
                .with_node(page("b", "a")),
        );
        let processor = processor_over(store.clone());

        let handle = processor.enqueue(unpublish("a")).await.unwrap();
        assert_eq!(handle.node_id(), "a");

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.updated, 1);
        assert!(!store.get_node("b").await.unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_jobs() {
        let store = Arc::new(
            MemoryStore::new()
                .with_node(page("a", "root"))
                .with_node(page("b", "a"))
                .with_node(page("c", "root"))
                .with_node(page("d", "c")),
        );
        let processor = processor_over(store.clone());

        let first = processor.enqueue(unpublish("a")).await.unwrap();
        let second = processor.enqueue(unpublish("c")).await.unwrap();
        processor.shutdown().await.unwrap();

        assert_eq!(first.wait().await.unwrap().updated, 1);
        assert_eq!(second.wait().await.unwrap().updated, 1);
        assert!(!store.get_node("d").await.unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let processor = processor_over(Arc::new(MemoryStore::new()));
        let queue = processor.queue();
        processor.shutdown().await.unwrap();
        processor.shutdown().await.unwrap();

        let err = queue.enqueue(unpublish("a")).await.unwrap_err();
        assert!(matches!(err, TreeServiceError::CascadeUnavailable));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let store = Arc::new(
            MemoryStore::new()
                .with_node(page("a", "root"))
                .with_node(page("b", "a")),
        );
        let processor = processor_over(store.clone());

        drop(processor.enqueue(unpublish("a")).await.unwrap());
        processor.shutdown().await.unwrap();

        assert!(!store.get_node("b").await.unwrap().unwrap().is_published);
    }
}
