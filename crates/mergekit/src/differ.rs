//! Snapshot differ: which upstream files changed between two revisions.

use std::path::Path;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{ChangeSet, Revision, Subdir};

/// Paths touched upstream between `old` and `new`, filtered to `subdir`.
///
/// Without an `old` snapshot (first run), or when nothing moved, every file
/// present at `new` is reported so the whole tree gets compared. A missing
/// `new` snapshot is fatal: there is nothing to compare against.
pub fn changed_paths(
    backend: &dyn Backend,
    repo: &Path,
    old: Option<&Revision>,
    new: Option<&Revision>,
    subdir: &Subdir,
) -> Result<ChangeSet> {
    let new = new.ok_or(Error::NoSnapshot)?;

    let paths = match old {
        Some(old) if old != new => {
            log::debug!("Diffing upstream {}..{}", old.short(), new.short());
            backend.diff_paths(repo, old, new)?
        }
        _ => {
            log::debug!("No previous snapshot; listing every file at {}", new.short());
            backend.list_files_at(repo, new)?
        }
    };

    let changes = ChangeSet::filtered(paths, subdir);
    log::info!("{} upstream path(s) under {subdir} to compare", changes.len());
    Ok(changes)
}
