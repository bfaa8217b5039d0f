//! Device-local favorites.
//!
//! Signed-out visitors can still star events; the ids are kept as a JSON
//! string array on disk, by default at `~/.local/share/huginn/favorites.json`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{HuginnError, Result};

/// Default store location under the platform data directory.
pub fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("huginn")
        .join("favorites.json")
}

/// A persisted set of favorite event ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFavorites {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl LocalFavorites {
    /// Load the set at `path`. A missing or unreadable file yields an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = read_ids(&path).unwrap_or_default();
        Self { path, ids }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    /// Flip `event_id` in or out of the set; returns whether it is now a favorite.
    pub fn toggle(&mut self, event_id: &str) -> bool {
        if self.ids.remove(event_id) {
            false
        } else {
            self.ids.insert(event_id.to_string());
            true
        }
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the set (atomic write via tmp + rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HuginnError::Configuration(format!(
                    "failed to create favorites dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.ids)?;
        std::fs::write(&tmp_path, json).map_err(|e| {
            HuginnError::Configuration(format!(
                "failed to write favorites {}: {e}",
                tmp_path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            HuginnError::Configuration(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), count = self.ids.len(), "saved local favorites");
        Ok(())
    }
}

fn read_ids(path: &Path) -> Option<BTreeSet<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read local favorites");
            return None;
        }
    };
    match serde_json::from_str::<Vec<String>>(&content) {
        Ok(ids) => Some(ids.into_iter().collect()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt local favorites, starting empty");
            None
        }
    }
}
