//! Per-frame dedup protocol.
//!
//! One frame runs strictly in sequence: index the image, search each detected
//! face, decide, issue one batched delete, then store the image and write the
//! record. The collection is shared with every other frame in flight and is
//! never locked here; two frames of the same identity indexed before either
//! searches will both be recorded as new, and a later frame that finds both
//! removes the duplicate.

use crate::config::DedupConfig;
use crate::engine::{DedupDecision, DedupEngine};
use crate::error::{FrameError, GatewayError};
use crate::gateway::RecognitionGateway;
use crate::partition::{StorageLayout, TimePartition};
use crate::policy::BackendPolicy;
use crate::sink::FramePersistenceSink;
use chrono_tz::Tz;
use common::frames::{
    DetectedFace, FramePackage, FrameRecord, IndexedFrame, PreviewFace, PreviewReport,
    ResolvedFace, DEFAULT_ORIENTATION,
};
use common::validation::{safe_unix_timestamp_f64, validate_capture_time, MAX_IMAGE_BYTES};
use std::collections::HashMap;
use std::sync::Arc;
use telemetry::metrics::{
    FACES_DELETED, FACES_INDEXED, FACES_NEW, FRAME_DURATION, MULTI_MATCH_SEARCHES,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const PASS_FINAL: &str = "final";
const PASS_PREVIEW: &str = "preview";

pub struct FrameDedupCoordinator {
    gateway: Arc<dyn RecognitionGateway>,
    sink: Arc<dyn FramePersistenceSink>,
    final_engine: DedupEngine,
    preview_engine: DedupEngine,
    max_matches: u32,
    storage: StorageLayout,
    timezone: Tz,
    policy: BackendPolicy,
}

impl FrameDedupCoordinator {
    pub fn new(
        gateway: Arc<dyn RecognitionGateway>,
        sink: Arc<dyn FramePersistenceSink>,
        config: &DedupConfig,
    ) -> Self {
        Self {
            gateway,
            sink,
            final_engine: DedupEngine::new(config.final_match_threshold),
            preview_engine: DedupEngine::new(config.preview_match_threshold),
            max_matches: config.max_matches.max(1),
            storage: config.storage.clone(),
            timezone: config.timezone,
            policy: config.backend.clone(),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn RecognitionGateway> {
        &self.gateway
    }

    pub fn sink(&self) -> &Arc<dyn FramePersistenceSink> {
        &self.sink
    }

    /// Deduplicate the faces in one frame and persist its record.
    #[instrument(skip_all, fields(frame_seq = pkg.frame_sequence_number))]
    pub async fn process_frame(&self, pkg: &FramePackage) -> Result<FrameRecord, FrameError> {
        validate_frame(pkg)?;

        let indexed = self.index(&pkg.image_bytes, PASS_FINAL).await?;
        let resolution = self
            .resolve(&indexed.faces, &self.final_engine, PASS_FINAL)
            .await?;
        let deleted = self.delete_obsolete(&resolution.obsolete, PASS_FINAL).await?;

        let record = self.build_record(pkg, indexed.orientation_correction, resolution.faces);

        // The image must be durable before any record points at it
        self.policy
            .call_sink("store_image", || {
                self.sink.store_image(&pkg.image_bytes, &record.image_location)
            })
            .await?;
        self.policy
            .call_sink("write_record", || self.sink.write_record(&record))
            .await?;

        info!(
            frame_id = %record.frame_id,
            faces = record.faces.len(),
            new_faces = record.faces.iter().filter(|f| f.is_new).count(),
            deleted,
            image = %record.image_location,
            "frame persisted"
        );

        Ok(record)
    }

    /// Run the dedup protocol with the preview threshold, without persisting.
    #[instrument(skip_all, fields(frame_seq = pkg.frame_sequence_number))]
    pub async fn preview_frame(&self, pkg: &FramePackage) -> Result<PreviewReport, FrameError> {
        validate_frame(pkg)?;
        let _timer = FRAME_DURATION
            .with_label_values(&[PASS_PREVIEW])
            .start_timer();

        let indexed = self.index(&pkg.image_bytes, PASS_PREVIEW).await?;
        let resolution = self
            .resolve(&indexed.faces, &self.preview_engine, PASS_PREVIEW)
            .await?;
        self.delete_obsolete(&resolution.obsolete, PASS_PREVIEW).await?;

        let faces: Vec<PreviewFace> = resolution
            .faces
            .iter()
            .zip(&resolution.match_counts)
            .map(|(face, matches)| PreviewFace {
                indexed_face_id: face.indexed_face_id.clone(),
                canonical_face_id: face.face_id.clone(),
                is_new: face.is_new,
                matches: *matches,
            })
            .collect();

        for face in faces.iter().filter(|f| f.is_new) {
            info!(face_id = %face.canonical_face_id, "new face found");
        }

        Ok(PreviewReport {
            frame_sequence_number: pkg.frame_sequence_number,
            faces,
            deleted_face_ids: resolution.obsolete,
        })
    }

    async fn index(&self, image: &[u8], pass: &'static str) -> Result<IndexedFrame, FrameError> {
        let indexed = self
            .policy
            .call_gateway("index_faces", || self.gateway.index_faces(image))
            .await?;

        FACES_INDEXED
            .with_label_values(&[pass])
            .inc_by(indexed.faces.len() as u64);
        debug!(faces = indexed.faces.len(), "image indexed");

        Ok(indexed)
    }

    /// Search and decide every detected face, in backend order
    async fn resolve(
        &self,
        faces: &[DetectedFace],
        engine: &DedupEngine,
        pass: &'static str,
    ) -> Result<FrameResolution, FrameError> {
        let mut resolution = FrameResolution::default();

        for face in faces {
            let search = self
                .policy
                .call_gateway("search_faces", || {
                    self.gateway
                        .search_faces(&face.face_id, self.max_matches, engine.match_threshold())
                })
                .await;

            let matches = match search {
                Ok(matches) => matches,
                Err(GatewayError::NotFound(msg)) => {
                    // Retired by a concurrent frame between index and search
                    warn!(face_id = %face.face_id, reason = %msg, "indexed face no longer in collection, skipping");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let decision = engine.decide(face, &matches);
            debug!(
                face_id = %face.face_id,
                canonical = %decision.canonical_face_id,
                is_new = decision.is_new,
                obsolete = decision.obsolete_face_ids.len(),
                "face resolved"
            );

            if decision.is_new {
                FACES_NEW.with_label_values(&[pass]).inc();
            }
            if decision.is_multi_match() {
                MULTI_MATCH_SEARCHES.inc();
            }

            resolution.apply(face, decision);
        }

        Ok(resolution)
    }

    /// Issue the frame's single batched delete. Returns the number removed.
    async fn delete_obsolete(
        &self,
        face_ids: &[String],
        pass: &'static str,
    ) -> Result<usize, FrameError> {
        if face_ids.is_empty() {
            return Ok(0);
        }

        match self
            .policy
            .call_gateway("delete_faces", || self.gateway.delete_faces(face_ids))
            .await
        {
            Ok(report) => {
                if !report.missing.is_empty() {
                    debug!(missing = ?report.missing, "faces were already absent");
                }
                FACES_DELETED
                    .with_label_values(&[pass])
                    .inc_by(report.deleted.len() as u64);
                Ok(report.deleted.len())
            }
            Err(GatewayError::NotFound(msg)) => {
                debug!(reason = %msg, "obsolete faces already absent");
                Ok(0)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    faces = face_ids.len(),
                    "duplicate delete failed; later frames will repeat it"
                );
                Err(err.into())
            }
        }
    }

    fn build_record(
        &self,
        pkg: &FramePackage,
        orientation_correction: Option<String>,
        faces: Vec<ResolvedFace>,
    ) -> FrameRecord {
        let frame_id = Uuid::new_v4().to_string();
        let partition = TimePartition::from_timestamp(pkg.approximate_capture_time, self.timezone);

        FrameRecord {
            image_location: self.storage.image_location(&partition, &frame_id),
            partition_key: partition.partition_key(),
            frame_id,
            frame_sequence_number: pkg.frame_sequence_number,
            processed_timestamp: safe_unix_timestamp_f64(),
            approximate_capture_timestamp: pkg.approximate_capture_time,
            faces,
            orientation_correction: orientation_correction
                .unwrap_or_else(|| DEFAULT_ORIENTATION.to_string()),
        }
    }
}

/// Reject frames that can never be indexed
pub fn validate_frame(pkg: &FramePackage) -> Result<(), FrameError> {
    if pkg.image_bytes.is_empty() {
        return Err(FrameError::MalformedFrame("image is empty".to_string()));
    }
    if pkg.image_bytes.len() > MAX_IMAGE_BYTES {
        return Err(FrameError::MalformedFrame(format!(
            "image is {} bytes, limit is {}",
            pkg.image_bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }
    validate_capture_time(pkg.approximate_capture_time)
        .map_err(|e| FrameError::MalformedFrame(e.to_string()))?;
    image::guess_format(&pkg.image_bytes)
        .map_err(|e| FrameError::MalformedFrame(format!("unrecognized image format: {e}")))?;
    Ok(())
}

/// Decisions accumulated across the faces of one frame
#[derive(Debug, Default)]
struct FrameResolution {
    faces: Vec<ResolvedFace>,
    match_counts: Vec<usize>,
    /// Frame-level deletion set, in the order IDs were retired
    obsolete: Vec<String>,
    /// Retired face ID -> the canonical ID that retired it
    retired_by: HashMap<String, String>,
}

impl FrameResolution {
    /// Follow retirements made earlier in this frame to the surviving ID
    fn surviving_id(&self, face_id: &str) -> String {
        let mut current = face_id;
        for _ in 0..=self.retired_by.len() {
            match self.retired_by.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    fn apply(&mut self, face: &DetectedFace, decision: DedupDecision) {
        let canonical = self.surviving_id(&decision.canonical_face_id);

        for face_id in decision.obsolete_face_ids {
            if face_id == canonical || self.retired_by.contains_key(&face_id) {
                continue;
            }
            // Faces earlier in this frame that resolved to the retired ID
            for resolved in self.faces.iter_mut().filter(|f| f.face_id == face_id) {
                resolved.face_id = canonical.clone();
            }
            self.retired_by.insert(face_id.clone(), canonical.clone());
            self.obsolete.push(face_id);
        }

        self.match_counts.push(decision.match_count);
        self.faces.push(ResolvedFace {
            face_id: canonical,
            indexed_face_id: face.face_id.clone(),
            is_new: decision.is_new,
            confidence: face.confidence,
            bounding_box: face.bounding_box,
        });
    }
}
