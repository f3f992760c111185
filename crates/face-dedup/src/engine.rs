//! Identity deduplication decisions.
//!
//! Given a face that was just indexed and the existing collection members a
//! similarity search matched against it, the engine decides whether the
//! identity is new, which single face ID survives as canonical, and which face
//! IDs must be removed from the collection. The new face itself is removed when
//! an existing record has a higher detection confidence.

use common::frames::{DetectedFace, MatchCandidate};
use std::collections::HashSet;
use tracing::warn;

/// Outcome of deduplicating one face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupDecision {
    /// False whenever the identity already had at least one match
    pub is_new: bool,

    /// Face ID that represents the identity after deduplication
    pub canonical_face_id: String,

    /// Face IDs to delete, in the order they were judged obsolete.
    /// Never contains `canonical_face_id` and never repeats an ID.
    pub obsolete_face_ids: Vec<String>,

    /// Number of candidates that took part in the decision
    pub match_count: usize,

    /// Number of results the search returned, before filtering
    pub search_results: usize,
}

impl DedupDecision {
    fn new_identity(face: &DetectedFace, search_results: usize) -> Self {
        Self {
            is_new: true,
            canonical_face_id: face.face_id.clone(),
            obsolete_face_ids: Vec::new(),
            match_count: 0,
            search_results,
        }
    }

    /// Whether the search returned more than one result for the identity
    pub fn is_multi_match(&self) -> bool {
        self.search_results > 1
    }
}

/// Deduplication decision engine, parameterized by match threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupEngine {
    match_threshold: f32,
}

impl DedupEngine {
    pub fn new(match_threshold: f32) -> Self {
        Self { match_threshold }
    }

    /// Minimum similarity for a search result to count as the same identity
    pub fn match_threshold(&self) -> f32 {
        self.match_threshold
    }

    /// Decide how to resolve `new_face` against its search matches.
    ///
    /// `matches` is expected in the backend's ranking order (descending).
    /// Candidates that are the new face itself, fall below the threshold, or
    /// repeat an earlier candidate's ID are ignored.
    pub fn decide(&self, new_face: &DetectedFace, matches: &[MatchCandidate]) -> DedupDecision {
        if matches.len() > 1 {
            warn!(
                face_id = %new_face.face_id,
                matches = matches.len(),
                "search returned more than one match; collection may hold duplicates of this identity"
            );
        }

        let mut seen = HashSet::new();
        let candidates: Vec<&MatchCandidate> = matches
            .iter()
            .filter(|c| c.face_id != new_face.face_id)
            .filter(|c| c.similarity >= self.match_threshold)
            .filter(|c| seen.insert(c.face_id.as_str()))
            .collect();

        if candidates.is_empty() {
            return DedupDecision::new_identity(new_face, matches.len());
        }

        let mut canonical: Option<&MatchCandidate> = None;
        let mut obsolete: Vec<String> = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            if candidate.confidence > new_face.confidence {
                match canonical {
                    // strictly greater keeps the earliest-ranked candidate on ties
                    Some(current) if candidate.confidence > current.confidence => {
                        obsolete.push(current.face_id.clone());
                        canonical = Some(candidate);
                    }
                    Some(_) => obsolete.push(candidate.face_id.clone()),
                    None => canonical = Some(candidate),
                }
            } else {
                obsolete.push(candidate.face_id.clone());
            }
        }

        let canonical_face_id = match canonical {
            Some(winner) => {
                obsolete.push(new_face.face_id.clone());
                winner.face_id.clone()
            }
            None => new_face.face_id.clone(),
        };

        DedupDecision {
            is_new: false,
            canonical_face_id,
            obsolete_face_ids: obsolete,
            match_count: candidates.len(),
            search_results: matches.len(),
        }
    }
}
