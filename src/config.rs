//! Configuration for the harvester.
//!
//! Environment-level settings (where the chromium binary lives) come from
//! an optional TOML file in the user config directory, overridable per
//! invocation. Run parameters are collected once into an immutable
//! [`HarvestConfig`] and passed down; nothing reads global state later.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::image::SaveMode;
use crate::mission::Mission;

/// Default number of concurrent download workers.
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 4;

/// Contents of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Path to the chromium/chrome binary used for page rendering.
    /// When unset, the browser layer falls back to autodetection.
    #[serde(default)]
    pub chrome_binary: Option<String>,
}

impl ConfigFile {
    fn load_from(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring unparsable config file {}: {e}", path.display());
                None
            }
        }
    }
}

/// Resolved environment settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub chrome_binary: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from, in order of precedence: the explicit chrome
    /// path (flag or environment), an explicit config file, the default
    /// config file location.
    pub fn load(explicit_chrome: Option<PathBuf>, config_path: Option<&Path>) -> Self {
        if let Some(chrome) = explicit_chrome {
            return Self {
                chrome_binary: Some(chrome),
            };
        }
        let config = config_path
            .map(Path::to_path_buf)
            .or_else(default_config_path)
            .and_then(|p| ConfigFile::load_from(&p))
            .unwrap_or_default();
        Self {
            chrome_binary: config
                .chrome_binary
                .map(|p| PathBuf::from(shellexpand::tilde(&p).as_ref())),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mars-harvester").join("config.toml"))
}

/// Immutable parameters of one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub mission: Mission,
    /// Root directory the mission's path layout is created under.
    pub save_root: PathBuf,
    /// First page to harvest (1-based).
    pub from_page: u32,
    /// Last page to harvest; clamped to the catalog's page count.
    pub to_page: u32,
    /// Re-fetch images that are already on disk.
    pub force: bool,
    /// Size of the download worker pool.
    pub workers: usize,
    pub save_mode: SaveMode,
    /// JPEG quality in [0.0, 1.0]; only meaningful when converting.
    pub quality: f32,
    /// Stop after this many consecutive pages with nothing new.
    pub stop_after_already_downloaded_pages: Option<u32>,
}
