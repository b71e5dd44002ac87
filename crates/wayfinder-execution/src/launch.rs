//! Production assembly of the engine.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use wayfinder_application::Engine;
use wayfinder_core::clock::SystemClock;
use wayfinder_core::config::EngineConfig;
use wayfinder_core::{Result, WayfinderError};
use wayfinder_infrastructure::{ConfigService, FileBlobStore, WayfinderPaths};
use wayfinder_interaction::{CompletionDispatcher, GeminiDispatcher};

/// Where the engine reads its configuration and keeps its blobs.
#[derive(Debug, Clone)]
pub struct LaunchPaths {
    pub config_file: PathBuf,
    pub blob_dir: PathBuf,
}

impl LaunchPaths {
    /// The platform config and data directories.
    pub fn platform() -> Result<Self> {
        Ok(Self {
            config_file: WayfinderPaths::config_file()?,
            blob_dir: WayfinderPaths::blob_dir()?,
        })
    }
}

/// Starts the engine against the Gemini API, using `GEMINI_API_KEY` and the
/// platform directories.
pub async fn launch() -> Result<Engine> {
    let paths = LaunchPaths::platform()?;
    let config = ConfigService::with_path(&paths.config_file).get_config()?;
    let dispatcher = GeminiDispatcher::try_from_env()
        .map_err(|e| WayfinderError::config(e.to_string()))?
        .with_model(config.model.clone());
    launch_with(&config, &paths, Arc::new(dispatcher)).await
}

/// Starts the engine with an explicit config, storage location and provider.
pub async fn launch_with(
    config: &EngineConfig,
    paths: &LaunchPaths,
    dispatcher: Arc<dyn CompletionDispatcher>,
) -> Result<Engine> {
    tracing::info!(
        "[Launch] Config {}, blobs in {}",
        paths.config_file.display(),
        paths.blob_dir.display()
    );
    let store = Arc::new(FileBlobStore::with_base_dir(&paths.blob_dir));
    Engine::start(config, store, dispatcher, Arc::new(SystemClock)).await
}

/// Keeps `engine` running until Ctrl-C, then cancels in-flight sends and
/// forces a final write of the thread tree.
pub async fn run_until_signal(engine: Engine) -> Result<()> {
    run_until(engine, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[Launch] Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await
}

/// Keeps `engine` running until `teardown` resolves, then shuts it down.
pub async fn run_until(engine: Engine, teardown: impl Future<Output = ()>) -> Result<()> {
    teardown.await;
    tracing::info!("[Launch] Teardown requested, flushing state");
    engine.shutdown().await
}
