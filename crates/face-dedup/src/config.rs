use crate::partition::StorageLayout;
use crate::policy::BackendPolicy;
use chrono_tz::Tz;
use std::time::Duration;

/// Match threshold for the final consistency pass
pub const DEFAULT_FINAL_MATCH_THRESHOLD: f32 = 90.0;

/// Match threshold for the interactive preview pass
pub const DEFAULT_PREVIEW_MATCH_THRESHOLD: f32 = 70.0;

/// Static settings for the dedup pipeline, supplied once at startup
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Similarity threshold used when deciding the persisted record
    pub final_match_threshold: f32,

    /// Similarity threshold used by the preview pass
    pub preview_match_threshold: f32,

    /// Maximum matches requested per face search
    pub max_matches: u32,

    pub storage: StorageLayout,

    /// Timezone used to partition frames by capture time
    pub timezone: Tz,

    pub backend: BackendPolicy,

    /// Frames processed concurrently
    pub worker_concurrency: usize,

    /// Attempts per frame before a retryable failure is reported
    pub max_frame_attempts: u32,

    /// Base delay between frame attempts (multiplied by the attempt number)
    pub frame_retry_delay: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            final_match_threshold: DEFAULT_FINAL_MATCH_THRESHOLD,
            preview_match_threshold: DEFAULT_PREVIEW_MATCH_THRESHOLD,
            max_matches: 2,
            storage: StorageLayout::default(),
            timezone: Tz::UTC,
            backend: BackendPolicy::default(),
            worker_concurrency: 3,
            max_frame_attempts: 3,
            frame_retry_delay: Duration::from_millis(250),
        }
    }
}
