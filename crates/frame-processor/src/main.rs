use anyhow::{Context, Result};
use face_dedup::{
    ingest, FrameDedupCoordinator, FramePersistenceSink, FrameWorkerPool, MemoryFaceCollection,
    MemoryFrameSink, RecognitionGateway,
};
use frame_processor::{
    api,
    cloud_sink::CloudFrameSink,
    config::{FrameProcessorConfig, RecognitionBackend, SinkType},
    rekognition::RekognitionGateway,
    FrameProcessorState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _logging = telemetry::init_with_service("frame-processor");

    info!("Starting frame processor...");

    let config = FrameProcessorConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        collection = %config.collection_id,
        final_threshold = config.dedup.final_match_threshold,
        preview_threshold = config.dedup.preview_match_threshold,
        workers = config.dedup.worker_concurrency,
        timezone = %config.dedup.timezone,
        "frame processor configuration"
    );

    let gateway: Arc<dyn RecognitionGateway> = match config.recognition_backend {
        RecognitionBackend::Memory => {
            warn!("using in-memory face collection; faces are not recognized");
            Arc::new(MemoryFaceCollection::new())
        }
        RecognitionBackend::Rekognition => {
            info!(collection = %config.collection_id, "using AWS Rekognition collection");
            Arc::new(
                RekognitionGateway::new(
                    config.collection_id.clone(),
                    config.aws_region.clone(),
                    config.max_faces_per_frame,
                )
                .await,
            )
        }
    };

    let sink: Arc<dyn FramePersistenceSink> = match config.sink_type {
        SinkType::Memory => {
            info!("using in-memory frame sink");
            Arc::new(MemoryFrameSink::new())
        }
        SinkType::Cloud => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL required for cloud sink")?;
            info!(bucket = %config.dedup.storage.bucket, "using S3 + PostgreSQL frame sink");
            Arc::new(CloudFrameSink::connect(&config.s3, database_url).await?)
        }
    };

    let coordinator = Arc::new(FrameDedupCoordinator::new(gateway, sink, &config.dedup));
    let pool = FrameWorkerPool::new(
        coordinator,
        config.dedup.worker_concurrency,
        config.dedup.max_frame_attempts,
        config.dedup.frame_retry_delay,
    );

    let (submitter, source) = ingest::channel(config.ingest_queue_depth);
    let shutdown = CancellationToken::new();
    let ingestion = tokio::spawn(ingest::run_ingestion(source, pool.clone(), shutdown.clone()));

    let state = FrameProcessorState::new(config.collection_id.clone(), pool, submitter);
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Frame processor listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining in-flight batches...");
    shutdown.cancel();
    if let Err(e) = ingestion.await {
        error!("Ingestion task ended abnormally: {}", e);
    }

    info!("Frame processor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
