//! chezmoi source tree operations used while importing an upstream snapshot.

use anyhow::{Context, Result, bail};
use mergekit::mapper::{ATTRIBUTE_PREFIXES, DOT_PREFIX};
use std::fs;
use std::path::{Path, PathBuf};

use crate::runner;

/// Returns true if a top-level entry name is chezmoi-managed
pub fn is_managed_name(name: &str) -> bool {
    name.starts_with(DOT_PREFIX) || ATTRIBUTE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Remove every chezmoi-managed entry at the top of `root`.
///
/// Entries named in `keep` and `.git` are never touched. Returns the
/// removed paths, sorted.
pub fn clean_source_tree(root: &Path, keep: &[&str]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root)
        .with_context(|| format!("Failed to read source tree: {}", root.display()))?;

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == ".git" || keep.contains(&&*name) || !is_managed_name(&name) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}

/// Import `tarball` into the source tree at `root` with `chezmoi import`
pub fn import(root: &Path, destination: &Path, tarball: &Path) -> Result<()> {
    let source = root.to_string_lossy();
    let dest = destination.to_string_lossy();
    let tar = tarball.to_string_lossy();
    let status = runner::run_in(
        root,
        "chezmoi",
        &["import", "--source", &source, "--destination", &dest, &tar],
    )?;
    if !status.success() {
        bail!("chezmoi import failed ({status})");
    }
    Ok(())
}

/// Show `chezmoi diff` for the source tree at `root`
pub fn diff(root: &Path) -> Result<()> {
    let source = root.to_string_lossy();
    let status = runner::run_in(root, "chezmoi", &["diff", "--source", &source])?;
    if !status.success() {
        bail!("chezmoi diff failed ({status})");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
