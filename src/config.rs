use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scan::DetectParams;

/// On-disk application settings: where the SeetaFace model file lives
/// and the detector tuning used for scans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the SeetaFace model file. Scanning is disabled until one
    /// is configured.
    pub model_path: Option<PathBuf>,
    /// Detector tuning knobs.
    pub detect: DetectParams,
}

impl AppConfig {
    /// Default config location, e.g.
    /// `~/.config/face-browser/config.json` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("face-browser");
        path.push("config.json");
        Some(path)
    }

    /// Read a config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("ignoring malformed config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Write the config file, creating the parent directory first.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, json)
    }
}
