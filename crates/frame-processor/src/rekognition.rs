//! AWS Rekognition face collection.

use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_sdk_rekognition::{
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::Blob,
    types::{Face, Image},
    Client,
};
use common::frames::{BoundingBox, DeleteReport, DetectedFace, IndexedFrame, MatchCandidate};
use face_dedup::{GatewayError, RecognitionGateway};
use tracing::{debug, instrument, warn};

pub struct RekognitionGateway {
    client: Client,
    collection_id: String,
    max_faces: Option<u32>,
}

impl RekognitionGateway {
    pub async fn new(collection_id: String, region: Option<String>, max_faces: Option<u32>) -> Self {
        let region_provider = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(Region::new("us-east-1"));
        let conf = aws_config::defaults(BehaviorVersion::v2025_08_07())
            .region(region_provider)
            .load()
            .await;

        Self {
            client: Client::new(&conf),
            collection_id,
            max_faces,
        }
    }

}

/// Rekognition operation a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    IndexFaces,
    SearchFaces,
    DeleteFaces,
    DescribeCollection,
}

/// Error kind for a Rekognition error code.
///
/// Image rejections only mean a corrupt frame when they answer `IndexFaces`,
/// the one call that carries image bytes. On a search the same parameter
/// rejection means the face ID is no longer in the collection.
fn classify_code(operation: Operation, code: Option<&str>) -> fn(String) -> GatewayError {
    match (operation, code) {
        (_, Some("ResourceNotFoundException")) => GatewayError::NotFound,
        (_, Some("ThrottlingException" | "ProvisionedThroughputExceededException")) => {
            GatewayError::RateLimited
        }
        (
            Operation::IndexFaces,
            Some(
                "InvalidImageFormatException"
                | "ImageTooLargeException"
                | "InvalidParameterException",
            ),
        ) => GatewayError::InvalidImage,
        (Operation::SearchFaces, Some("InvalidParameterException")) => GatewayError::NotFound,
        _ => GatewayError::Unavailable,
    }
}

fn classify<E>(operation: Operation, err: aws_sdk_rekognition::error::SdkError<E>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let kind = classify_code(operation, err.code());
    kind(DisplayErrorContext(&err).to_string())
}

fn detected_face(face: &Face) -> Option<DetectedFace> {
    let bounding_box = face
        .bounding_box()
        .map(|b| BoundingBox {
            left: b.left().unwrap_or_default(),
            top: b.top().unwrap_or_default(),
            width: b.width().unwrap_or_default(),
            height: b.height().unwrap_or_default(),
        })
        .unwrap_or_default();

    Some(DetectedFace {
        face_id: face.face_id()?.to_string(),
        confidence: face.confidence().unwrap_or_default(),
        bounding_box,
    })
}

#[async_trait]
impl RecognitionGateway for RekognitionGateway {
    #[instrument(skip(self, image), fields(collection = %self.collection_id, bytes = image.len()))]
    async fn index_faces(&self, image: &[u8]) -> Result<IndexedFrame, GatewayError> {
        let output = self
            .client
            .index_faces()
            .collection_id(&self.collection_id)
            .image(Image::builder().bytes(Blob::new(image.to_vec())).build())
            .set_max_faces(self.max_faces.map(|n| n as i32))
            .send()
            .await
            .map_err(|e| classify(Operation::IndexFaces, e))?;

        let faces: Vec<DetectedFace> = output
            .face_records()
            .iter()
            .filter_map(|record| record.face())
            .filter_map(detected_face)
            .collect();

        if faces.len() < output.face_records().len() {
            warn!(
                returned = output.face_records().len(),
                usable = faces.len(),
                "face records without a face id were skipped"
            );
        }
        debug!(faces = faces.len(), "indexed faces");

        Ok(IndexedFrame {
            faces,
            orientation_correction: output
                .orientation_correction()
                .map(|o| o.as_str().to_string()),
        })
    }

    #[instrument(skip(self), fields(collection = %self.collection_id))]
    async fn search_faces(
        &self,
        face_id: &str,
        max_results: u32,
        match_threshold: f32,
    ) -> Result<Vec<MatchCandidate>, GatewayError> {
        let output = self
            .client
            .search_faces()
            .collection_id(&self.collection_id)
            .face_id(face_id)
            .max_faces(max_results as i32)
            .face_match_threshold(match_threshold)
            .send()
            .await
            .map_err(|e| classify(Operation::SearchFaces, e))?;

        Ok(output
            .face_matches()
            .iter()
            .filter_map(|m| {
                let face = m.face()?;
                Some(MatchCandidate {
                    face_id: face.face_id()?.to_string(),
                    confidence: face.confidence().unwrap_or_default(),
                    similarity: m.similarity().unwrap_or_default(),
                })
            })
            .collect())
    }

    #[instrument(skip(self, face_ids), fields(collection = %self.collection_id, count = face_ids.len()))]
    async fn delete_faces(&self, face_ids: &[String]) -> Result<DeleteReport, GatewayError> {
        let output = self
            .client
            .delete_faces()
            .collection_id(&self.collection_id)
            .set_face_ids(Some(face_ids.to_vec()))
            .send()
            .await
            .map_err(|e| classify(Operation::DeleteFaces, e))?;

        let deleted: Vec<String> = output.deleted_faces().to_vec();
        let missing = face_ids
            .iter()
            .filter(|id| !deleted.contains(id))
            .cloned()
            .collect();

        Ok(DeleteReport { deleted, missing })
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        self.client
            .describe_collection()
            .collection_id(&self.collection_id)
            .send()
            .await
            .map(|_| true)
            .map_err(|e| classify(Operation::DescribeCollection, e))
    }
}
