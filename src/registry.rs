//! # Bridge Registry
//!
//! Durable store of installed programs, keyed by program name.
//!
//! ## Storage Model
//!
//! One JSON file per entry under the registry directory:
//!
//! ```text
//! ~/.debridge/registry/
//! ├── gimp.json
//! └── hello.json
//! ```
//!
//! ## Concurrency Model
//!
//! Multiple CLI processes may mutate the registry concurrently. Each
//! entry lives in its own file, so insert and delete are atomic at the
//! filesystem level and writers touching different names cannot clobber
//! each other's updates:
//!
//! - `insert` writes a unique temp file, then hard-links it to the
//!   entry's final name. The link fails if the name exists, which is the
//!   `AlreadyExists` check and the insert in one atomic step.
//! - `remove` is a single unlink.
//!
//! The registry is the single source of truth for "installed programs";
//! callers never hold long-lived entry references across operations.

use crate::error::{Error, Result};
use crate::policy::IntegrationFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A persisted bridge definition: how to invoke one installed program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEntry {
    /// Program name; unique key across the registry.
    pub name: String,
    /// Image reference returned by the engine at build time.
    pub image: String,
    /// Integration flags requested at create time, replayed by `run`.
    pub flags: IntegrationFlags,
    /// Command override; `None` means the package's own executable name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub custom_command: Option<String>,
    /// Desktop icon path, if one was requested.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub desktop_icon: Option<PathBuf>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// Directory-backed registry of bridge entries.
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    /// Opens (or initializes) a registry at the given directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "opened registry");
        Ok(Self { dir })
    }

    /// Returns the backing directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`] if the name is present; the existing
    /// entry is never overwritten. The check and the insert are one
    /// atomic filesystem operation (the hard link below), so concurrent
    /// creates of the same name cannot both succeed.
    pub fn insert(&self, entry: BridgeEntry) -> Result<()> {
        let content = serde_json::to_string_pretty(&entry)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let temp_path = self.dir.join(format!("tmp.{}", uuid::Uuid::now_v7()));
        fs::write(&temp_path, content)?;
        let linked = fs::hard_link(&temp_path, self.entry_path(&entry.name));
        let _ = fs::remove_file(&temp_path);

        match linked {
            Ok(()) => {
                info!(name = %entry.name, image = %entry.image, "registered program");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::AlreadyExists(entry.name))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Looks up an entry by program name.
    pub fn get(&self, name: &str) -> Result<BridgeEntry> {
        if !is_valid_key(name) {
            return Err(Error::NotInstalled(name.to_string()));
        }
        read_entry(&self.entry_path(name), name)
    }

    /// Removes an entry by program name and returns it.
    ///
    /// Releasing the underlying image is the caller's responsibility.
    pub fn remove(&self, name: &str) -> Result<BridgeEntry> {
        let entry = self.get(name)?;
        match fs::remove_file(self.entry_path(name)) {
            Ok(()) => {
                info!(name = %entry.name, "unregistered program");
                Ok(entry)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotInstalled(name.to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Lists all entries, oldest first.
    pub fn list(&self) -> Result<Vec<BridgeEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Leftover temp files from crashed writers are not entries.
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            entries.push(read_entry(&path, name)?);
        }
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn read_entry(path: &Path, name: &str) -> Result<BridgeEntry> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::NotInstalled(name.to_string()))
        }
        Err(e) => return Err(Error::Io(e)),
    };
    serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))
}

/// Entry names land on the filesystem; anything outside the program name
/// alphabet cannot have been installed.
fn is_valid_key(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
