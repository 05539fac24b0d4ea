//! Durable sync state: the last upstream revision that was reconciled.
//!
//! Stored as a single token in a marker file at the root of the source
//! tree, so it travels with the tree and can be committed if desired.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use mergekit::Revision;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Marker file recording the last synced upstream revision
#[derive(Debug, Clone)]
pub struct SyncMarker {
    path: PathBuf,
}

impl SyncMarker {
    /// Marker `file_name` under the source tree `root`
    pub fn new(root: &Path, file_name: &str) -> Self {
        Self {
            path: root.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last synced revision, or `None` before the first sync
    pub fn load(&self) -> Result<Option<Revision>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let revision = Revision::new(content);
                log::debug!(
                    "Loaded sync marker from {}: {:?}",
                    self.path.display(),
                    revision
                );
                Ok(revision)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No sync marker at {}", self.path.display());
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read sync marker: {}", self.path.display())),
        }
    }

    /// Record `revision` as synced
    pub fn save(&self, revision: &Revision) -> Result<()> {
        fs::write(&self.path, format!("{revision}\n"))
            .with_context(|| format!("Failed to write sync marker: {}", self.path.display()))?;
        log::debug!("Saved sync marker {} to {}", revision.short(), self.path.display());
        Ok(())
    }

    /// When the marker was last written
    pub fn last_written(&self) -> Option<DateTime<Local>> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Local>::from(modified))
    }
}

// ============================================================================
// Tests
// ============================================================================
