//! Frame and face contracts shared by the dedup core and the frame processor.
//!
//! These types cross the ingestion boundary (JSON over HTTP) and the
//! persistence boundary (object store + record store), so every one of them
//! is serde-serializable.

use serde::{Deserialize, Serialize};

/// A single captured frame as delivered by the capture client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePackage {
    /// Approximate capture time (Unix timestamp in fractional seconds)
    pub approximate_capture_time: f64,

    /// Frame counter of the capture session (not unique across sessions)
    pub frame_sequence_number: u64,

    /// Encoded image (base64 encoded for JSON transport)
    #[serde(with = "base64_bytes")]
    pub image_bytes: Vec<u8>,
}

/// Face bounding box, as ratios of the overall image size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// A face the recognition backend detected and enrolled in the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Backend-assigned face ID, unique within the collection
    pub face_id: String,

    /// Detection confidence (0.0 to 100.0)
    pub confidence: f32,

    pub bounding_box: BoundingBox,
}

/// Result of indexing one image into the collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexedFrame {
    /// Faces in the order the backend returned them
    pub faces: Vec<DetectedFace>,

    /// Orientation correction the backend applied, if it reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation_correction: Option<String>,
}

/// An existing collection member that a similarity search judged to be the
/// same identity as the searched face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub face_id: String,

    /// Detection confidence the stored face was enrolled with (0.0 to 100.0)
    pub confidence: f32,

    /// Similarity to the searched face (0.0 to 100.0)
    pub similarity: f32,
}

/// Outcome of a batched delete against the collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Face IDs the backend removed
    pub deleted: Vec<String>,

    /// Face IDs that were already absent
    #[serde(default)]
    pub missing: Vec<String>,
}

/// Where a frame image lives in the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageLocation {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// A detected face after deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFace {
    /// Canonical face ID that represents this identity in the collection
    pub face_id: String,

    /// Face ID the backend assigned when this frame was indexed
    pub indexed_face_id: String,

    /// False when the identity was already known to the collection
    pub is_new: bool,

    pub confidence: f32,

    pub bounding_box: BoundingBox,
}

/// Persisted metadata for one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_id: String,

    pub frame_sequence_number: u64,

    /// When processing finished (Unix timestamp in fractional seconds)
    pub processed_timestamp: f64,

    /// Capture time carried by the frame package
    pub approximate_capture_timestamp: f64,

    pub faces: Vec<ResolvedFace>,

    pub orientation_correction: String,

    pub image_location: ImageLocation,

    /// Capture year and month (`YYYYMM`) in the partition timezone
    pub partition_key: String,
}

/// Orientation recorded when the backend does not report one
pub const DEFAULT_ORIENTATION: &str = "ROTATE_0";

/// Request body for batch frame submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameBatchRequest {
    pub frames: Vec<FramePackage>,
}

/// Per-frame result of batch processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameOutcome {
    /// Frame was processed and its record written
    Persisted { record: FrameRecord },

    /// Frame was rejected and will not be retried
    Dropped {
        frame_sequence_number: u64,
        reason: String,
    },

    /// Frame failed after exhausting its attempts; redelivery may succeed
    Failed {
        frame_sequence_number: u64,
        attempts: u32,
        error: String,
    },
}

impl FrameOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, FrameOutcome::Persisted { .. })
    }

    pub fn record(&self) -> Option<&FrameRecord> {
        match self {
            FrameOutcome::Persisted { record } => Some(record),
            _ => None,
        }
    }
}

/// Result of processing one delivered batch, in delivery order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<FrameOutcome>,
}

impl BatchReport {
    pub fn persisted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_persisted()).count()
    }

    pub fn records(&self) -> impl Iterator<Item = &FrameRecord> {
        self.outcomes.iter().filter_map(FrameOutcome::record)
    }
}

/// Per-face result of the interactive preview pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewFace {
    pub indexed_face_id: String,
    pub canonical_face_id: String,
    pub is_new: bool,
    pub matches: usize,
}

/// Result of the interactive preview pass over one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviewReport {
    pub frame_sequence_number: u64,
    pub faces: Vec<PreviewFace>,
    pub deleted_face_ids: Vec<String>,
}

impl PreviewReport {
    pub fn new_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.is_new).count()
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
