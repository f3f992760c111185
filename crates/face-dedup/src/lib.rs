//! Face identity deduplication for streamed video frames.
//!
//! Each frame's faces are enrolled in a shared recognition collection, then
//! searched against it; when an identity already has records, only the
//! highest-confidence face is kept and the others are deleted. Frames are
//! processed concurrently with no cross-frame locking, so the collection
//! converges to one face per identity over repeated frames rather than
//! immediately.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod memory_collection;
pub mod memory_sink;
pub mod partition;
pub mod policy;
pub mod pool;
pub mod sink;

pub use config::DedupConfig;
pub use coordinator::FrameDedupCoordinator;
pub use engine::{DedupDecision, DedupEngine};
pub use error::{FrameError, GatewayError, SinkError};
pub use gateway::RecognitionGateway;
pub use ingest::{channel, run_ingestion, FrameBatch, FrameSubmitter, IngestionSource};
pub use memory_collection::{MemoryFaceCollection, ScriptedFace};
pub use memory_sink::MemoryFrameSink;
pub use pool::FrameWorkerPool;
pub use sink::FramePersistenceSink;
