//! Bridge configuration.
//!
//! Small, file-backed settings layer: where the registry lives and which
//! device nodes the `devices` flag may expose. The device set is a
//! configuration decision, deliberately not a hardcoded "all of /dev".

use crate::constants::{REGISTRY_DIR_NAME, SETTINGS_FILE_NAME, STATE_DIR_NAME};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistent bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Registry directory location.
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    /// Device nodes the `devices` flag may expose. Empty by default:
    /// exposing devices is always an explicit, configured decision.
    #[serde(default)]
    pub device_allowlist: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            device_allowlist: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads settings from the given file, falling back to defaults when
    /// the file does not exist. A present-but-invalid file is an error,
    /// not a silent fallback.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Default settings file location (`~/.debridge/config.json`).
    pub fn default_path() -> PathBuf {
        state_dir().join(SETTINGS_FILE_NAME)
    }
}

fn default_registry_path() -> PathBuf {
    state_dir().join(REGISTRY_DIR_NAME)
}

fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR_NAME)
}
