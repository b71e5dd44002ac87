//! Platform paths for wayfinder configuration and data.
//!
//! ```text
//! ~/.config/wayfinder/         # Config directory
//! └── config.toml              # Engine configuration
//!
//! ~/.local/share/wayfinder/    # Data directory
//! └── blobs/                   # FileBlobStore root
//! ```

use std::path::PathBuf;
use wayfinder_core::{Result, WayfinderError};

const APP_DIR: &str = "wayfinder";

pub struct WayfinderPaths;

impl WayfinderPaths {
    /// Returns the configuration directory (e.g., `~/.config/wayfinder/`).
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| WayfinderError::config("Cannot find config directory"))
    }

    /// Returns the data directory (e.g., `~/.local/share/wayfinder/`).
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| WayfinderError::config("Cannot find data directory"))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Root directory of the default file blob store.
    pub fn blob_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("blobs"))
    }
}
