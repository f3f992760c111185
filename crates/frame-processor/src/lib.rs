pub mod api;
pub mod cloud_sink;
pub mod config;
pub mod rekognition;
pub mod state;

pub use config::FrameProcessorConfig;
pub use state::FrameProcessorState;
