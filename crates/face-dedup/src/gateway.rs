use crate::error::GatewayError;
use async_trait::async_trait;
use common::frames::{DeleteReport, IndexedFrame, MatchCandidate};

/// Face recognition backend holding the shared face collection.
///
/// The backend is the only point of serialization for collection mutations;
/// callers hold no locks across these calls.
#[async_trait]
pub trait RecognitionGateway: Send + Sync {
    /// Detect faces in an image and enroll each of them in the collection
    async fn index_faces(&self, image: &[u8]) -> Result<IndexedFrame, GatewayError>;

    /// Find enrolled faces similar to `face_id`, best match first
    async fn search_faces(
        &self,
        face_id: &str,
        max_results: u32,
        match_threshold: f32,
    ) -> Result<Vec<MatchCandidate>, GatewayError>;

    /// Remove faces from the collection in one call
    async fn delete_faces(&self, face_ids: &[String]) -> Result<DeleteReport, GatewayError>;

    /// Health check - verify the backend is reachable
    async fn health_check(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}
