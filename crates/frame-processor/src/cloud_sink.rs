//! Frame persistence on S3 (images) and PostgreSQL (records).

use crate::config::S3Settings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client};
use common::frames::{FrameRecord, ImageLocation};
use face_dedup::{FramePersistenceSink, SinkError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, instrument};

pub async fn s3_client(cfg: &S3Settings) -> Client {
    let region = Region::new(cfg.region.clone().unwrap_or_else(|| "us-east-1".to_string()));
    let region_provider = RegionProviderChain::first_try(region.clone()).or_default_provider();
    let base = aws_config::defaults(BehaviorVersion::v2025_08_07())
        .region(region_provider)
        .load()
        .await;

    let mut conf = S3ConfigBuilder::from(&base).region(region);
    if let Some(endpoint) = &cfg.endpoint {
        conf = conf.endpoint_url(endpoint.clone()).force_path_style(true);
    }
    if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
        conf = conf.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }

    Client::from_conf(conf.build())
}

pub struct CloudFrameSink {
    s3: Client,
    pool: PgPool,
}

impl CloudFrameSink {
    pub async fn connect(s3: &S3Settings, database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to frame record database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run frame record migrations")?;
        info!("frame record schema is up to date");

        Ok(Self {
            s3: s3_client(s3).await,
            pool,
        })
    }
}

#[async_trait]
impl FramePersistenceSink for CloudFrameSink {
    #[instrument(skip(self, image), fields(location = %location, bytes = image.len()))]
    async fn store_image(&self, image: &[u8], location: &ImageLocation) -> Result<(), SinkError> {
        self.s3
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type("image/jpeg")
            .body(ByteStream::from(image.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| SinkError::ImageStore {
                location: location.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })
    }

    #[instrument(skip(self, record), fields(frame_id = %record.frame_id))]
    async fn write_record(&self, record: &FrameRecord) -> Result<(), SinkError> {
        let record_error = |message: String| SinkError::RecordStore {
            frame_id: record.frame_id.clone(),
            message,
        };

        let faces = serde_json::to_value(&record.faces).map_err(|e| record_error(e.to_string()))?;

        // Retried writes of the same frame land on the same row
        sqlx::query(
            r#"
            INSERT INTO frame_records (
                frame_id, frame_sequence_number, processed_timestamp,
                approx_capture_timestamp, faces, orientation_correction,
                s3_bucket, s3_key, processed_year_month
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (frame_id) DO UPDATE SET
                processed_timestamp = EXCLUDED.processed_timestamp,
                faces = EXCLUDED.faces,
                orientation_correction = EXCLUDED.orientation_correction
            "#,
        )
        .bind(&record.frame_id)
        .bind(record.frame_sequence_number as i64)
        .bind(record.processed_timestamp)
        .bind(record.approximate_capture_timestamp)
        .bind(faces)
        .bind(&record.orientation_correction)
        .bind(&record.image_location.bucket)
        .bind(&record.image_location.key)
        .bind(&record.partition_key)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| record_error(e.to_string()))
    }

    async fn health_check(&self) -> Result<bool, SinkError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .or(Ok(false))
    }
}
