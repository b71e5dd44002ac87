//! Configuration service implementation.
//!
//! Loads [`EngineConfig`] from `~/.config/wayfinder/config.toml`. A missing
//! file yields the defaults.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use wayfinder_core::config::EngineConfig;
use wayfinder_core::{Result, WayfinderError};

use crate::paths::WayfinderPaths;

/// Loads and caches the engine configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<EngineConfig>>>,
}

impl ConfigService {
    /// Creates a service reading the platform config file.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(WayfinderPaths::config_file()?))
    }

    /// Creates a service reading `path` (for testing).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<EngineConfig> {
        if let Ok(read_lock) = self.config.read() {
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load_config()?;

        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    fn load_config(&self) -> Result<EngineConfig> {
        if !self.path.exists() {
            tracing::debug!(
                "[ConfigService] No config at {}, using defaults",
                self.path.display()
            );
            return Ok(EngineConfig::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            WayfinderError::io(format!(
                "Failed to read config {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content)?;
        tracing::info!("[ConfigService] Loaded config from {}", self.path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(temp_dir.path().join("config.toml"));
        assert_eq!(service.get_config().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_file_values_are_cached_until_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = 100\n").unwrap();

        let service = ConfigService::with_path(&path);
        assert_eq!(service.get_config().unwrap().debounce_ms, 100);

        std::fs::write(&path, "debounce_ms = 900\n").unwrap();
        assert_eq!(service.get_config().unwrap().debounce_ms, 100);

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().debounce_ms, 900);
    }

    #[test]
    fn test_invalid_toml_is_a_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"\n").unwrap();
        let err = ConfigService::with_path(&path).get_config().unwrap_err();
        assert!(err.is_serialization());
    }
}
