use crate::error::SinkError;
use crate::sink::FramePersistenceSink;
use async_trait::async_trait;
use common::frames::{FrameRecord, ImageLocation};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct SinkInner {
    images: HashMap<ImageLocation, Vec<u8>>,
    records: Vec<FrameRecord>,
    image_failures: u32,
    record_failures: u32,
}

/// In-memory frame sink for tests and local runs
#[derive(Default)]
pub struct MemoryFrameSink {
    inner: RwLock<SinkInner>,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` image writes
    pub async fn fail_image_writes(&self, count: u32) {
        self.inner.write().await.image_failures = count;
    }

    /// Fail the next `count` record writes
    pub async fn fail_record_writes(&self, count: u32) {
        self.inner.write().await.record_failures = count;
    }

    pub async fn records(&self) -> Vec<FrameRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn image(&self, location: &ImageLocation) -> Option<Vec<u8>> {
        self.inner.read().await.images.get(location).cloned()
    }

    pub async fn image_count(&self) -> usize {
        self.inner.read().await.images.len()
    }
}

#[async_trait]
impl FramePersistenceSink for MemoryFrameSink {
    async fn store_image(&self, image: &[u8], location: &ImageLocation) -> Result<(), SinkError> {
        let mut inner = self.inner.write().await;
        if inner.image_failures > 0 {
            inner.image_failures -= 1;
            return Err(SinkError::ImageStore {
                location: location.to_string(),
                message: "injected failure".to_string(),
            });
        }
        inner.images.insert(location.clone(), image.to_vec());
        Ok(())
    }

    async fn write_record(&self, record: &FrameRecord) -> Result<(), SinkError> {
        let mut inner = self.inner.write().await;
        if inner.record_failures > 0 {
            inner.record_failures -= 1;
            return Err(SinkError::RecordStore {
                frame_id: record.frame_id.clone(),
                message: "injected failure".to_string(),
            });
        }
        if !inner.images.contains_key(&record.image_location) {
            return Err(SinkError::RecordStore {
                frame_id: record.frame_id.clone(),
                message: format!("no image stored at {}", record.image_location),
            });
        }
        inner.records.push(record.clone());
        Ok(())
    }
}
