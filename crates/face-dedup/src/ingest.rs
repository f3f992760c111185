//! Frame ingestion.
//!
//! Batches arrive from an [`IngestionSource`] and are handed to the worker
//! pool as they arrive; a slow batch does not hold back the next one. The
//! bundled source is a bounded channel, so producers wait when the queue is
//! full rather than growing it.

use crate::pool::FrameWorkerPool;
use async_trait::async_trait;
use common::frames::{BatchReport, FramePackage};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A delivered batch of frames, optionally with a reply slot for its report
#[derive(Debug)]
pub struct FrameBatch {
    pub frames: Vec<FramePackage>,
    pub ack: Option<oneshot::Sender<BatchReport>>,
}

impl FrameBatch {
    pub fn with_ack(frames: Vec<FramePackage>) -> (Self, oneshot::Receiver<BatchReport>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                frames,
                ack: Some(tx),
            },
            rx,
        )
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("ingestion queue is closed")]
    Closed,

    #[error("batch was dropped before a report was produced")]
    Abandoned,
}

/// Where frame batches come from
#[async_trait]
pub trait IngestionSource: Send {
    /// Next batch, or `None` once the source is exhausted
    async fn next_batch(&mut self) -> Option<FrameBatch>;
}

/// Receiving half of the ingestion queue
pub struct ChannelIngestionSource {
    rx: mpsc::Receiver<FrameBatch>,
}

#[async_trait]
impl IngestionSource for ChannelIngestionSource {
    async fn next_batch(&mut self) -> Option<FrameBatch> {
        self.rx.recv().await
    }
}

/// Sending half of the ingestion queue
#[derive(Clone)]
pub struct FrameSubmitter {
    tx: mpsc::Sender<FrameBatch>,
}

impl FrameSubmitter {
    /// Queue a batch and wait for its report
    pub async fn submit(&self, frames: Vec<FramePackage>) -> Result<BatchReport, IngestError> {
        let (batch, rx) = FrameBatch::with_ack(frames);
        self.tx.send(batch).await.map_err(|_| IngestError::Closed)?;
        rx.await.map_err(|_| IngestError::Abandoned)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded ingestion queue of `depth` batches
pub fn channel(depth: usize) -> (FrameSubmitter, ChannelIngestionSource) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (FrameSubmitter { tx }, ChannelIngestionSource { rx })
}

/// Dispatch batches from `source` to `pool` until the source is exhausted or
/// `shutdown` fires, then wait for dispatched batches to finish.
pub async fn run_ingestion<S: IngestionSource>(
    mut source: S,
    pool: FrameWorkerPool,
    shutdown: CancellationToken,
) {
    let tracker = TaskTracker::new();
    info!("frame ingestion started");

    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("frame ingestion stopping");
                break;
            }
            batch = source.next_batch() => batch,
        };

        let Some(batch) = batch else {
            info!("ingestion source exhausted");
            break;
        };

        debug!(frames = batch.frames.len(), "dispatching batch");
        let pool = pool.clone();
        tracker.spawn(async move {
            let report = pool.process_batch(batch.frames).await;
            if let Some(ack) = batch.ack {
                if ack.send(report).is_err() {
                    warn!("batch submitter went away before the report was ready");
                }
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    info!("frame ingestion drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::coordinator::FrameDedupCoordinator;
    use crate::memory_collection::{MemoryFaceCollection, ScriptedFace};
    use crate::memory_sink::MemoryFrameSink;
    use std::sync::Arc;
    use std::time::Duration;

    fn pool(collection: Arc<MemoryFaceCollection>, sink: Arc<MemoryFrameSink>) -> FrameWorkerPool {
        let coordinator = Arc::new(FrameDedupCoordinator::new(
            collection,
            sink,
            &DedupConfig::default(),
        ));
        FrameWorkerPool::new(coordinator, 3, 1, Duration::from_millis(1))
    }

    fn frame(seq: u64) -> FramePackage {
        FramePackage {
            approximate_capture_time: 1_700_000_000.0,
            frame_sequence_number: seq,
            image_bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, seq as u8],
        }
    }

    #[tokio::test]
    async fn test_submit_returns_batch_report() {
        let collection = Arc::new(MemoryFaceCollection::new());
        let sink = Arc::new(MemoryFrameSink::new());
        collection
            .register_image(&frame(1).image_bytes, vec![ScriptedFace::new("alice", 92.0)])
            .await;

        let (submitter, source) = channel(4);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_ingestion(source, pool(collection, sink.clone()), shutdown.clone()));

        let report = submitter.submit(vec![frame(1), frame(2)]).await.unwrap();
        assert_eq!(report.persisted(), 2);
        assert_eq!(report.outcomes.len(), 2);

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(sink.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_queued_batches_drain_when_source_closes() {
        let collection = Arc::new(MemoryFaceCollection::new());
        let sink = Arc::new(MemoryFrameSink::new());

        let (submitter, source) = channel(4);
        for frames in [vec![frame(1)], vec![frame(2), frame(3)]] {
            submitter.tx.send(FrameBatch { frames, ack: None }).await.unwrap();
        }
        drop(submitter);

        run_ingestion(source, pool(collection, sink.clone()), CancellationToken::new()).await;
        assert_eq!(sink.records().await.len(), 3);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (submitter, source) = channel(1);
        drop(source);

        assert_eq!(submitter.submit(vec![frame(1)]).await, Err(IngestError::Closed));
        assert!(submitter.is_closed());
    }
}
