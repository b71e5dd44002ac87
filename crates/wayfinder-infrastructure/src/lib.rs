pub mod blob_store;
pub mod config_service;
pub mod cooldown_repository;
pub mod dto;
pub mod paths;
pub mod thread_tree_repository;
pub mod usage_store;

pub use blob_store::{FileBlobStore, InMemoryBlobStore};
pub use config_service::ConfigService;
pub use cooldown_repository::BlobCooldownRepository;
pub use paths::WayfinderPaths;
pub use thread_tree_repository::BlobThreadTreeRepository;
pub use usage_store::BlobUsageStore;

/// Blob key holding the serialized thread tree.
pub const THREADS_KEY: &str = "wayfinder.threads";
/// Blob key holding monthly usage counters.
pub const USAGE_KEY: &str = "wayfinder.usage";
/// Blob key holding the provider cooldown expiry.
pub const COOLDOWN_KEY: &str = "wayfinder.cooldown";
