use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use common::validation::{normalize_key_prefix, validate_id, validate_positive, validate_threshold};
use face_dedup::partition::StorageLayout;
use face_dedup::policy::BackendPolicy;
use face_dedup::DedupConfig;
use std::{env, net::SocketAddr, str::FromStr, time::Duration};

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionBackend {
    Memory,
    Rekognition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkType {
    Memory,
    /// S3 images plus Postgres records
    Cloud,
}

/// Object store connection settings. Unset fields fall back to the AWS
/// default provider chain.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FrameProcessorConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    /// Recognition collection shared by every frame
    pub collection_id: String,

    pub recognition_backend: RecognitionBackend,

    /// Region for the recognition client
    pub aws_region: Option<String>,

    /// Upper bound on faces indexed per image
    pub max_faces_per_frame: Option<u32>,

    pub sink_type: SinkType,
    pub database_url: Option<String>,
    pub s3: S3Settings,

    /// Batches that may wait for a worker before submitters block
    pub ingest_queue_depth: usize,

    pub dedup: DedupConfig,
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl FrameProcessorConfig {
    pub fn from_env() -> Result<Self> {
        let bind = env::var("FRAME_PROCESSOR_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
        let bind_addr: SocketAddr = bind.parse().context("invalid FRAME_PROCESSOR_ADDR")?;

        let collection_id =
            env::var("COLLECTION_ID").unwrap_or_else(|_| "face-collection".to_string());
        validate_id(&collection_id, "COLLECTION_ID")?;

        let recognition_backend = match env::var("RECOGNITION_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "rekognition" | "aws" => RecognitionBackend::Rekognition,
            _ => RecognitionBackend::Memory,
        };

        let sink_type = match env::var("SINK_TYPE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "cloud" => SinkType::Cloud,
            _ => SinkType::Memory,
        };

        let database_url = if sink_type == SinkType::Cloud {
            Some(env::var("DATABASE_URL").context("DATABASE_URL required for cloud sink")?)
        } else {
            env::var("DATABASE_URL").ok()
        };

        let bucket = env::var("S3_BUCKET").unwrap_or_else(|_| "frames".to_string());
        validate_id(&bucket, "S3_BUCKET")?;
        let key_root = normalize_key_prefix(
            &env::var("FRAMES_KEY_ROOT").unwrap_or_else(|_| "frames/".to_string()),
            "FRAMES_KEY_ROOT",
        )?;

        let timezone_name = env::var("PARTITION_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow!("invalid PARTITION_TIMEZONE '{}': {}", timezone_name, e))?;

        let defaults = DedupConfig::default();

        let final_match_threshold =
            parsed("FINAL_MATCH_THRESHOLD").unwrap_or(defaults.final_match_threshold);
        validate_threshold(final_match_threshold, "FINAL_MATCH_THRESHOLD")?;

        let preview_match_threshold =
            parsed("PREVIEW_MATCH_THRESHOLD").unwrap_or(defaults.preview_match_threshold);
        validate_threshold(preview_match_threshold, "PREVIEW_MATCH_THRESHOLD")?;

        let max_matches: u32 = parsed("MAX_MATCHES").unwrap_or(defaults.max_matches);
        validate_positive(max_matches as usize, "MAX_MATCHES")?;

        let worker_concurrency =
            parsed("WORKER_CONCURRENCY").unwrap_or(defaults.worker_concurrency);
        validate_positive(worker_concurrency, "WORKER_CONCURRENCY")?;

        let max_frame_attempts: u32 =
            parsed("FRAME_MAX_ATTEMPTS").unwrap_or(defaults.max_frame_attempts);
        validate_positive(max_frame_attempts as usize, "FRAME_MAX_ATTEMPTS")?;

        let ingest_queue_depth = parsed("INGEST_QUEUE_DEPTH").unwrap_or(64);
        validate_positive(ingest_queue_depth, "INGEST_QUEUE_DEPTH")?;

        let backend = BackendPolicy {
            call_timeout: Duration::from_millis(parsed("BACKEND_TIMEOUT_MS").unwrap_or(5000)),
            ..BackendPolicy::default()
        };

        Ok(Self {
            bind_addr,
            collection_id,
            recognition_backend,
            aws_region: env::var("AWS_REGION").ok(),
            max_faces_per_frame: parsed("MAX_FACES_PER_FRAME"),
            sink_type,
            database_url,
            s3: S3Settings {
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: env::var("S3_REGION").ok(),
                access_key: env::var("S3_ACCESS_KEY").ok(),
                secret_key: env::var("S3_SECRET_KEY").ok(),
            },
            ingest_queue_depth,
            dedup: DedupConfig {
                final_match_threshold,
                preview_match_threshold,
                max_matches,
                storage: StorageLayout { bucket, key_root },
                timezone,
                backend,
                worker_concurrency,
                max_frame_attempts,
                ..defaults
            },
        })
    }
}
