use crate::error::SinkError;
use async_trait::async_trait;
use common::frames::{FrameRecord, ImageLocation};

/// Durable destination for processed frames
#[async_trait]
pub trait FramePersistenceSink: Send + Sync {
    /// Store the encoded frame image at `location`
    async fn store_image(&self, image: &[u8], location: &ImageLocation) -> Result<(), SinkError>;

    /// Write the frame's structured record
    async fn write_record(&self, record: &FrameRecord) -> Result<(), SinkError>;

    /// Health check - verify both stores are reachable
    async fn health_check(&self) -> Result<bool, SinkError> {
        Ok(true)
    }
}
