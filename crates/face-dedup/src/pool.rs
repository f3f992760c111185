//! Bounded-concurrency batch processing.
//!
//! Every frame of a batch gets its own task; a semaphore bounds how many run
//! against the backend at once. Frames retry independently and a failure in
//! one never cancels its siblings.

use crate::coordinator::FrameDedupCoordinator;
use crate::error::FrameError;
use common::frames::{BatchReport, FrameOutcome, FramePackage, PreviewReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{FRAMES_IN_FLIGHT, FRAMES_PROCESSED, FRAME_ATTEMPTS, FRAME_DURATION};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct FrameWorkerPool {
    coordinator: Arc<FrameDedupCoordinator>,
    permits: Arc<Semaphore>,
    max_frame_attempts: u32,
    retry_delay: Duration,
}

impl FrameWorkerPool {
    pub fn new(
        coordinator: Arc<FrameDedupCoordinator>,
        concurrency: usize,
        max_frame_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            coordinator,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            max_frame_attempts: max_frame_attempts.max(1),
            retry_delay,
        }
    }

    pub fn coordinator(&self) -> &Arc<FrameDedupCoordinator> {
        &self.coordinator
    }

    /// Preview one frame. Shares the batch permits, so previews and batches
    /// together never exceed the pool's concurrency against the backend.
    pub async fn preview(&self, frame: &FramePackage) -> Result<PreviewReport, FrameError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FrameError::RecognitionUnavailable("worker pool closed".to_string()))?;
        self.coordinator.preview_frame(frame).await
    }

    /// Process every frame of a batch. Outcomes are reported in delivery
    /// order, one per frame.
    pub async fn process_batch(&self, frames: Vec<FramePackage>) -> BatchReport {
        let total = frames.len();
        let handles: Vec<_> = frames
            .into_iter()
            .map(|frame| {
                let pool = self.clone();
                let seq = frame.frame_sequence_number;
                (seq, tokio::spawn(async move { pool.run_frame(frame).await }))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        for (seq, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(frame_seq = seq, error = %e, "frame task aborted");
                    FRAMES_PROCESSED.with_label_values(&["failed"]).inc();
                    FrameOutcome::Failed {
                        frame_sequence_number: seq,
                        attempts: 0,
                        error: format!("frame task aborted: {e}"),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = BatchReport { outcomes };
        info!(frames = total, persisted = report.persisted(), "batch processed");
        report
    }

    async fn run_frame(&self, frame: FramePackage) -> FrameOutcome {
        let seq = frame.frame_sequence_number;
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return FrameOutcome::Failed {
                    frame_sequence_number: seq,
                    attempts: 0,
                    error: "worker pool closed".to_string(),
                }
            }
        };

        FRAMES_IN_FLIGHT.inc();
        let start = Instant::now();
        let outcome = self.attempt_frame(&frame).await;
        FRAMES_IN_FLIGHT.dec();

        FRAME_DURATION
            .with_label_values(&["final"])
            .observe(start.elapsed().as_secs_f64());
        let label = match &outcome {
            FrameOutcome::Persisted { .. } => "persisted",
            FrameOutcome::Dropped { .. } => "dropped",
            FrameOutcome::Failed { .. } => "failed",
        };
        FRAMES_PROCESSED.with_label_values(&[label]).inc();

        outcome
    }

    async fn attempt_frame(&self, frame: &FramePackage) -> FrameOutcome {
        let seq = frame.frame_sequence_number;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.coordinator.process_frame(frame).await {
                Ok(record) => {
                    FRAME_ATTEMPTS.with_label_values(&["ok"]).inc();
                    return FrameOutcome::Persisted { record };
                }
                Err(err) => err,
            };
            FRAME_ATTEMPTS.with_label_values(&[err.kind()]).inc();

            if !err.is_retryable() {
                warn!(frame_seq = seq, error = %err, "dropping frame");
                return FrameOutcome::Dropped {
                    frame_sequence_number: seq,
                    reason: err.to_string(),
                };
            }

            if attempt >= self.max_frame_attempts {
                return self.exhausted(seq, attempt, &err);
            }

            warn!(
                frame_seq = seq,
                attempt,
                max_attempts = self.max_frame_attempts,
                error = %err,
                "frame attempt failed, retrying"
            );
            tokio::time::sleep(self.retry_delay * attempt).await;
        }
    }

    fn exhausted(&self, seq: u64, attempts: u32, err: &FrameError) -> FrameOutcome {
        error!(frame_seq = seq, attempts, error = %err, "frame failed after all attempts");
        FrameOutcome::Failed {
            frame_sequence_number: seq,
            attempts,
            error: err.to_string(),
        }
    }
}
