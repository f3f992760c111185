pub mod frames;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
