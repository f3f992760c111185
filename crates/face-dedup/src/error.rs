use thiserror::Error;

/// Errors reported by a [`crate::gateway::RecognitionGateway`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The target face or collection does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend throttled the request; safe to retry after a delay
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("recognition backend unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The backend could not decode the submitted image
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl GatewayError {
    /// Whether the same call may succeed if repeated after a backoff delay
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }
}

/// Errors reported by a [`crate::sink::FramePersistenceSink`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinkError {
    #[error("storing image at {location} failed: {message}")]
    ImageStore { location: String, message: String },

    #[error("writing record for frame {frame_id} failed: {message}")]
    RecordStore { frame_id: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

/// Per-frame failure kinds
///
/// Every variant is local to the frame that produced it; sibling frames in
/// the same batch are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Index, search or delete could not complete; retry the whole frame
    #[error("recognition backend unavailable: {0}")]
    RecognitionUnavailable(String),

    /// The target was already absent from the collection
    #[error("not found in collection: {0}")]
    RecognitionNotFound(String),

    /// Image or record could not be stored; no record references the image
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The frame can never be processed; drop it
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

impl FrameError {
    /// Whether re-running the frame may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FrameError::RecognitionUnavailable(_) | FrameError::PersistenceFailure(_)
        )
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::RecognitionUnavailable(_) => "recognition_unavailable",
            FrameError::RecognitionNotFound(_) => "recognition_not_found",
            FrameError::PersistenceFailure(_) => "persistence_failure",
            FrameError::MalformedFrame(_) => "malformed_frame",
        }
    }
}

impl From<GatewayError> for FrameError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => FrameError::RecognitionNotFound(msg),
            GatewayError::InvalidImage(msg) => FrameError::MalformedFrame(msg),
            other @ (GatewayError::RateLimited(_)
            | GatewayError::Unavailable(_)
            | GatewayError::Timeout { .. }) => {
                FrameError::RecognitionUnavailable(other.to_string())
            }
        }
    }
}

impl From<SinkError> for FrameError {
    fn from(err: SinkError) -> Self {
        FrameError::PersistenceFailure(err.to_string())
    }
}
