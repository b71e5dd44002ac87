pub mod clock;
pub mod config;
pub mod directive;
pub mod error;
pub mod insight;
pub mod quota;
pub mod slug;
pub mod storage;
pub mod thread;

// Re-export common error type
pub use error::{Result, WayfinderError};
