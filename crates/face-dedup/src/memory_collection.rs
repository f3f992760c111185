//! In-memory face collection for tests and local runs.
//!
//! Images are registered up front with the identities they contain; indexing
//! an unregistered image detects no faces. Faces of the same identity match
//! each other with a fixed similarity, faces of different identities never
//! match.

use crate::error::GatewayError;
use crate::gateway::RecognitionGateway;
use async_trait::async_trait;
use common::frames::{BoundingBox, DeleteReport, DetectedFace, IndexedFrame, MatchCandidate};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Similarity reported between two faces of the same identity
pub const SAME_IDENTITY_SIMILARITY: f32 = 99.0;

/// A face the collection will "detect" in a registered image
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFace {
    pub identity: String,
    pub confidence: f32,
}

impl ScriptedFace {
    pub fn new(identity: impl Into<String>, confidence: f32) -> Self {
        Self {
            identity: identity.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredFace {
    face_id: String,
    identity: String,
    confidence: f32,
    /// Hidden from searches until the collection settles
    visible: bool,
}

#[derive(Default)]
struct CollectionInner {
    images: HashMap<Vec<u8>, Vec<ScriptedFace>>,
    faces: Vec<StoredFace>,
    next_face: u64,
    deferred_visibility: bool,
    failures: HashMap<&'static str, VecDeque<GatewayError>>,
    index_calls: usize,
    search_calls: usize,
    delete_calls: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MemoryFaceCollection {
    inner: RwLock<CollectionInner>,
    latency: Option<Duration>,
}

impl MemoryFaceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the collection
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Newly indexed faces stay invisible to searches until [`Self::settle`]
    /// is called. Models a backend whose index lags its writes.
    pub async fn defer_visibility(&self, deferred: bool) {
        self.inner.write().await.deferred_visibility = deferred;
    }

    /// Make every indexed face visible to searches
    pub async fn settle(&self) {
        let mut inner = self.inner.write().await;
        for face in inner.faces.iter_mut() {
            face.visible = true;
        }
    }

    pub async fn register_image(&self, image: &[u8], faces: Vec<ScriptedFace>) {
        self.inner.write().await.images.insert(image.to_vec(), faces);
    }

    /// Fail the next call of `operation` (`index_faces`, `search_faces` or
    /// `delete_faces`) with `error`. Queued failures are consumed in order.
    pub async fn fail_next(&self, operation: &'static str, error: GatewayError) {
        self.inner
            .write()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Stored face IDs for an identity, in enrollment order
    pub async fn faces_for(&self, identity: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .faces
            .iter()
            .filter(|f| f.identity == identity)
            .map(|f| f.face_id.clone())
            .collect()
    }

    pub async fn face_count(&self) -> usize {
        self.inner.read().await.faces.len()
    }

    pub async fn contains(&self, face_id: &str) -> bool {
        self.inner.read().await.faces.iter().any(|f| f.face_id == face_id)
    }

    pub async fn index_calls(&self) -> usize {
        self.inner.read().await.index_calls
    }

    pub async fn search_calls(&self) -> usize {
        self.inner.read().await.search_calls
    }

    /// Face ID lists passed to each delete call
    pub async fn delete_calls(&self) -> Vec<Vec<String>> {
        self.inner.read().await.delete_calls.clone()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(inner: &mut CollectionInner, operation: &'static str) -> Option<GatewayError> {
        inner.failures.get_mut(operation).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl RecognitionGateway for MemoryFaceCollection {
    async fn index_faces(&self, image: &[u8]) -> Result<IndexedFrame, GatewayError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        inner.index_calls += 1;
        if let Some(err) = Self::take_failure(&mut inner, "index_faces") {
            return Err(err);
        }

        let scripted = inner.images.get(image).cloned().unwrap_or_default();
        let visible = !inner.deferred_visibility;
        let mut detected = Vec::with_capacity(scripted.len());

        for (position, face) in scripted.into_iter().enumerate() {
            inner.next_face += 1;
            let face_id = format!("face-{:06}", inner.next_face);
            inner.faces.push(StoredFace {
                face_id: face_id.clone(),
                identity: face.identity,
                confidence: face.confidence,
                visible,
            });
            detected.push(DetectedFace {
                face_id,
                confidence: face.confidence,
                bounding_box: BoundingBox {
                    left: 0.1 * position as f32,
                    top: 0.1,
                    width: 0.1,
                    height: 0.2,
                },
            });
        }

        Ok(IndexedFrame {
            faces: detected,
            orientation_correction: None,
        })
    }

    async fn search_faces(
        &self,
        face_id: &str,
        max_results: u32,
        match_threshold: f32,
    ) -> Result<Vec<MatchCandidate>, GatewayError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        inner.search_calls += 1;
        if let Some(err) = Self::take_failure(&mut inner, "search_faces") {
            return Err(err);
        }

        let identity = inner
            .faces
            .iter()
            .find(|f| f.face_id == face_id)
            .map(|f| f.identity.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("face {face_id} is not in the collection")))?;

        if SAME_IDENTITY_SIMILARITY < match_threshold {
            return Ok(Vec::new());
        }

        let mut matches: Vec<MatchCandidate> = inner
            .faces
            .iter()
            .filter(|f| f.visible && f.face_id != face_id && f.identity == identity)
            .map(|f| MatchCandidate {
                face_id: f.face_id.clone(),
                confidence: f.confidence,
                similarity: SAME_IDENTITY_SIMILARITY,
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.face_id.cmp(&b.face_id))
        });
        matches.truncate(max_results as usize);
        Ok(matches)
    }

    async fn delete_faces(&self, face_ids: &[String]) -> Result<DeleteReport, GatewayError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        inner.delete_calls.push(face_ids.to_vec());
        if let Some(err) = Self::take_failure(&mut inner, "delete_faces") {
            return Err(err);
        }

        let mut report = DeleteReport::default();
        for face_id in face_ids {
            match inner.faces.iter().position(|f| &f.face_id == face_id) {
                Some(idx) => {
                    inner.faces.remove(idx);
                    report.deleted.push(face_id.clone());
                }
                None => report.missing.push(face_id.clone()),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_index_enrolls_registered_faces() {
        let collection = MemoryFaceCollection::new();
        collection
            .register_image(b"img", vec![ScriptedFace::new("alice", 95.0), ScriptedFace::new("bob", 80.0)])
            .await;

        let indexed = collection.index_faces(b"img").await.unwrap();
        assert_eq!(indexed.faces.len(), 2);
        assert_eq!(collection.face_count().await, 2);
        assert_eq!(collection.faces_for("alice").await, vec![indexed.faces[0].face_id.clone()]);

        let unknown = collection.index_faces(b"nobody").await.unwrap();
        assert!(unknown.faces.is_empty());
    }

    #[tokio::test]
    async fn test_search_excludes_self_and_other_identities() {
        let collection = MemoryFaceCollection::new();
        collection.register_image(b"a", vec![ScriptedFace::new("alice", 90.0)]).await;
        collection.register_image(b"b", vec![ScriptedFace::new("bob", 90.0)]).await;

        let first = collection.index_faces(b"a").await.unwrap().faces[0].face_id.clone();
        collection.index_faces(b"b").await.unwrap();
        let second = collection.index_faces(b"a").await.unwrap().faces[0].face_id.clone();

        let matches = collection.search_faces(&second, 5, 90.0).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].face_id, first);

        assert!(collection.search_faces(&second, 5, 99.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_orders_by_confidence_and_truncates() {
        let collection = MemoryFaceCollection::new();
        for (image, confidence) in [(b"1", 80.0), (b"2", 97.0), (b"3", 90.0)] {
            collection
                .register_image(image, vec![ScriptedFace::new("alice", confidence)])
                .await;
            collection.index_faces(image).await.unwrap();
        }
        collection.register_image(b"4", vec![ScriptedFace::new("alice", 85.0)]).await;
        let query_face = collection.index_faces(b"4").await.unwrap().faces[0].face_id.clone();

        let matches = collection.search_faces(&query_face, 2, 90.0).await.unwrap();
        let confidences: Vec<f32> = matches.iter().map(|m| m.confidence).collect();
        assert_eq!(confidences, vec![97.0, 90.0]);
    }

    #[tokio::test]
    async fn test_search_for_absent_face_is_not_found() {
        let collection = MemoryFaceCollection::new();
        let err = collection.search_faces("face-missing", 2, 90.0).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deferred_faces_are_hidden_until_settled() {
        let collection = MemoryFaceCollection::new();
        collection.defer_visibility(true).await;
        collection.register_image(b"a", vec![ScriptedFace::new("alice", 90.0)]).await;

        collection.index_faces(b"a").await.unwrap();
        let query_face = collection.index_faces(b"a").await.unwrap().faces[0].face_id.clone();
        assert!(collection.search_faces(&query_face, 2, 90.0).await.unwrap().is_empty());

        collection.settle().await;
        assert_eq!(collection.search_faces(&query_face, 2, 90.0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_missing_ids() {
        let collection = MemoryFaceCollection::new();
        collection.register_image(b"a", vec![ScriptedFace::new("alice", 90.0)]).await;
        let id = collection.index_faces(b"a").await.unwrap().faces[0].face_id.clone();

        let report = collection
            .delete_faces(&[id.clone(), "face-gone".to_string()])
            .await
            .unwrap();
        assert_eq!(report.deleted, vec![id]);
        assert_eq!(report.missing, vec!["face-gone".to_string()]);
        assert_eq!(collection.face_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let collection = MemoryFaceCollection::new();
        collection
            .fail_next("index_faces", GatewayError::Unavailable("down".into()))
            .await;

        assert!(collection.index_faces(b"x").await.is_err());
        assert!(collection.index_faces(b"x").await.is_ok());
        assert_eq!(collection.index_calls().await, 2);
    }
}
