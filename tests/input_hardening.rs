/// Resilience tests for hostile or extreme input
///
/// Tests cover:
/// 1. Oversized and path-like identifiers
/// 2. Object key prefix traversal
/// 3. Non-finite thresholds and capture times
/// 4. Oversized images and out-of-range timestamps
/// 5. Sustained concurrent load
use common::frames::{FrameOutcome, FramePackage};
use common::validation::{self, MAX_IMAGE_BYTES};
use face_dedup::{
    DedupConfig, FrameDedupCoordinator, FrameWorkerPool, MemoryFaceCollection, MemoryFrameSink,
    ScriptedFace,
};
use std::sync::Arc;
use std::time::Duration;

fn jpeg(tag: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}

fn pool(collection: Arc<MemoryFaceCollection>, sink: Arc<MemoryFrameSink>) -> FrameWorkerPool {
    let coordinator = Arc::new(FrameDedupCoordinator::new(
        collection,
        sink,
        &DedupConfig::default(),
    ));
    FrameWorkerPool::new(coordinator, 3, 3, Duration::from_millis(1))
}

// ============================================================================
// Identifier and key validation
// ============================================================================

#[test]
fn test_validate_id_rejects_oversized_input() {
    let oversized = "A".repeat(10 * 1024 * 1024);

    let error = validation::validate_id(&oversized, "COLLECTION_ID")
        .unwrap_err()
        .to_string();
    assert!(error.contains("exceeds maximum"), "unexpected error: {}", error);
}

#[test]
fn test_validate_id_rejects_path_separators() {
    for id in ["../etc", "a/b", "a\\b", "   "] {
        assert!(validation::validate_id(id, "S3_BUCKET").is_err(), "accepted {:?}", id);
    }
    assert!(validation::validate_id("face-collection", "COLLECTION_ID").is_ok());
}

#[test]
fn test_key_prefix_cannot_escape_root() {
    for prefix in ["/frames", "frames/../secrets", "..", "a\\b"] {
        assert!(
            validation::normalize_key_prefix(prefix, "FRAMES_KEY_ROOT").is_err(),
            "accepted {:?}",
            prefix
        );
    }

    assert_eq!(validation::normalize_key_prefix("", "FRAMES_KEY_ROOT").unwrap(), "");
    assert_eq!(
        validation::normalize_key_prefix("site-a/frames", "FRAMES_KEY_ROOT").unwrap(),
        "site-a/frames/"
    );
    // A dotted name is not a traversal segment
    assert!(validation::normalize_key_prefix("v1..2/", "FRAMES_KEY_ROOT").is_ok());
}

#[test]
fn test_thresholds_must_be_finite_and_in_range() {
    for value in [f32::NAN, f32::INFINITY, -1.0, 100.5] {
        assert!(validation::validate_threshold(value, "FINAL_MATCH_THRESHOLD").is_err());
    }
    assert!(validation::validate_threshold(0.0, "FINAL_MATCH_THRESHOLD").is_ok());
    assert!(validation::validate_threshold(100.0, "FINAL_MATCH_THRESHOLD").is_ok());
}

// ============================================================================
// Frame contents
// ============================================================================

#[tokio::test]
async fn test_oversized_image_is_dropped() {
    let collection = Arc::new(MemoryFaceCollection::new());
    let sink = Arc::new(MemoryFrameSink::new());
    let mut huge = jpeg("huge");
    huge.resize(MAX_IMAGE_BYTES + 1, 0);

    let report = pool(collection.clone(), sink)
        .process_batch(vec![FramePackage {
            approximate_capture_time: 1_700_000_000.0,
            frame_sequence_number: 1,
            image_bytes: huge,
        }])
        .await;

    assert!(matches!(report.outcomes[0], FrameOutcome::Dropped { .. }));
    assert_eq!(collection.index_calls().await, 0);
}

#[tokio::test]
async fn test_non_finite_capture_time_is_dropped() {
    let collection = Arc::new(MemoryFaceCollection::new());
    let sink = Arc::new(MemoryFrameSink::new());

    let frames = [f64::NAN, f64::INFINITY, -5.0]
        .into_iter()
        .enumerate()
        .map(|(i, ts)| FramePackage {
            approximate_capture_time: ts,
            frame_sequence_number: i as u64,
            image_bytes: jpeg("t"),
        })
        .collect();
    let report = pool(collection, sink).process_batch(frames).await;

    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, FrameOutcome::Dropped { .. })));
}

#[tokio::test]
async fn test_far_future_capture_time_is_dropped() {
    let collection = Arc::new(MemoryFaceCollection::new());
    let sink = Arc::new(MemoryFrameSink::new());

    let report = pool(collection.clone(), sink.clone())
        .process_batch(vec![
            FramePackage {
                approximate_capture_time: 1e300,
                frame_sequence_number: 1,
                image_bytes: jpeg("future"),
            },
            FramePackage {
                approximate_capture_time: validation::MAX_CAPTURE_TIME,
                frame_sequence_number: 2,
                image_bytes: jpeg("last-second"),
            },
        ])
        .await;

    match &report.outcomes[0] {
        FrameOutcome::Dropped { reason, .. } => assert!(reason.contains("malformed"), "{}", reason),
        other => panic!("expected a dropped frame, got {:?}", other),
    }
    assert_eq!(collection.index_calls().await, 1);

    let record = report.records().next().unwrap();
    assert_eq!(record.frame_sequence_number, 2);
    assert_eq!(record.partition_key, "999912");
    assert_eq!(sink.records().await.len(), 1);
}

// ============================================================================
// Load
// ============================================================================

#[tokio::test]
async fn test_sustained_load_converges() {
    let collection = Arc::new(MemoryFaceCollection::new());
    let sink = Arc::new(MemoryFrameSink::new());
    let identities = ["ana", "ben", "cy", "dee", "eve"];
    for (i, who) in identities.iter().enumerate() {
        collection
            .register_image(&jpeg(who), vec![ScriptedFace::new(*who, 80.0 + i as f32)])
            .await;
    }

    let frames = (0..50u64)
        .map(|seq| FramePackage {
            approximate_capture_time: 1_700_000_000.0 + seq as f64,
            frame_sequence_number: seq,
            image_bytes: jpeg(identities[seq as usize % identities.len()]),
        })
        .collect();
    let pool = pool(collection.clone(), sink.clone());

    let report = pool.process_batch(frames).await;
    assert_eq!(report.outcomes.len(), 50);
    assert_eq!(report.persisted(), 50);

    // Quiet frames per identity settle any duplicates left by overlap
    let mut seq = 100;
    for _ in 0..5 {
        for who in identities {
            seq += 1;
            let pkg = FramePackage {
                approximate_capture_time: 1_700_000_100.0,
                frame_sequence_number: seq,
                image_bytes: jpeg(who),
            };
            pool.coordinator().process_frame(&pkg).await.unwrap();
        }
        if collection.face_count().await == identities.len() {
            break;
        }
    }

    for who in identities {
        assert_eq!(collection.faces_for(who).await.len(), 1, "{} not converged", who);
    }
    assert!(sink.records().await.len() >= 55);
}
