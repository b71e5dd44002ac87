//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs represent the versioned schema for persisting data. They are
//! private to the infrastructure layer and handle the evolution of the
//! storage format over time.
//!
//! ### ThreadTree Version History
//! - **1.0.0**: Initial schema

mod thread_tree;

pub use thread_tree::{ThreadTreeV1_0_0, ThreadV1_0_0, create_thread_tree_migrator};
