use common::frames::{BatchReport, FramePackage, PreviewReport};
use face_dedup::ingest::IngestError;
use face_dedup::{FrameError, FrameSubmitter, FrameWorkerPool};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct FrameProcessorState {
    inner: Arc<FrameProcessorStateInner>,
}

struct FrameProcessorStateInner {
    collection_id: String,
    pool: FrameWorkerPool,
    submitter: FrameSubmitter,
}

impl FrameProcessorState {
    pub fn new(
        collection_id: String,
        pool: FrameWorkerPool,
        submitter: FrameSubmitter,
    ) -> Self {
        Self {
            inner: Arc::new(FrameProcessorStateInner {
                collection_id,
                pool,
                submitter,
            }),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.inner.collection_id
    }

    /// Queue a batch for the worker pool and wait for its report
    pub async fn submit_batch(&self, frames: Vec<FramePackage>) -> Result<BatchReport, IngestError> {
        self.inner.submitter.submit(frames).await
    }

    /// Preview a frame under the same concurrency bound as batches
    pub async fn preview(&self, frame: &FramePackage) -> Result<PreviewReport, FrameError> {
        self.inner.pool.preview(frame).await
    }

    /// Reachability of each collaborator plus the ingestion queue
    pub async fn health(&self) -> HashMap<&'static str, bool> {
        let coordinator = self.inner.pool.coordinator();
        let (gateway, sink) = tokio::join!(
            coordinator.gateway().health_check(),
            coordinator.sink().health_check()
        );

        HashMap::from([
            ("recognition", matches!(gateway, Ok(true))),
            ("persistence", matches!(sink, Ok(true))),
            ("ingestion", !self.inner.submitter.is_closed()),
        ])
    }
}
