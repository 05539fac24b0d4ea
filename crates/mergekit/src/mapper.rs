//! Path mapping between upstream names and the local chezmoi source tree.
//!
//! chezmoi encodes file attributes as prefixes on each path component
//! (`private_dot_ssh/executable_run.sh`). Local files are normalized by
//! stripping those prefixes, and an upstream path is resolved by finding the
//! local file whose normalized path ends with it.
//!
//! The lookup is a suffix heuristic: unrelated files that share a trailing
//! segment can be mis-associated, so every candidate is collected and
//! ambiguity is reported instead of silently taking the first hit.

use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::types::Subdir;

/// Attribute prefixes stripped from the start of each path component.
pub const ATTRIBUTE_PREFIXES: [&str; 8] = [
    "private_",
    "executable_",
    "exact_",
    "symlink_",
    "modify_",
    "create_",
    "empty_",
    "readonly_",
];

/// Prefix encoding a leading `.` in a component
pub const DOT_PREFIX: &str = "dot_";

/// Directories never considered when looking for local matches
pub const ALWAYS_EXCLUDED: &[&str] = &[".git"];

/// Outcome of looking up the local counterpart of an upstream path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalMatch {
    /// Nothing local corresponds to the upstream path
    NotFound,
    /// Exactly one local file matched
    Unique(PathBuf),
    /// Several local files matched; `chosen` is the first in traversal order
    Ambiguous {
        /// The candidate that will be used
        chosen: PathBuf,
        /// The remaining candidates
        others: Vec<PathBuf>,
    },
}

impl LocalMatch {
    /// The local path to use, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound => None,
            Self::Unique(path) | Self::Ambiguous { chosen: path, .. } => Some(path),
        }
    }

    /// Returns true if more than one candidate matched
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// Strip chezmoi name-mangling from a relative path.
///
/// `private_dot_config/executable_run.sh` becomes `.config/run.sh`.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .map(normalize_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_component(component: &str) -> String {
    let mut rest = component;
    while let Some(stripped) = ATTRIBUTE_PREFIXES
        .iter()
        .find_map(|prefix| rest.strip_prefix(prefix))
    {
        rest = stripped;
    }
    match rest.strip_prefix(DOT_PREFIX) {
        Some(name) => format!(".{name}"),
        None => rest.to_string(),
    }
}

/// Upstream path as it should appear (normalized) in the local tree.
pub fn clean(path: &str, subdir: &Subdir) -> String {
    normalize(subdir.strip(path))
}

/// Relative path of a local file rendered with `/` separators
pub fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// List every regular file under `root` as paths relative to `root`.
///
/// Skips every `.git` directory and the subtrees at the `excluded` paths,
/// which are relative to `root` and may be nested (`vendor/ext`).
/// Traversal is sorted by file name so results are reproducible.
pub fn local_files(root: &Path, excluded: &[String]) -> Vec<PathBuf> {
    let excluded: Vec<&Path> = excluded
        .iter()
        .map(|e| Path::new(e.trim_matches('/')))
        .filter(|e| !e.as_os_str().is_empty())
        .collect();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if ALWAYS_EXCLUDED.contains(&name.as_ref()) {
                return false;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                return true;
            };
            !excluded.iter().any(|e| relative.starts_with(e))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files
}

/// Find the local file corresponding to `upstream_path`.
///
/// Returned paths are relative to `local_root`.
pub fn find_local_match(
    local_root: &Path,
    upstream_path: &str,
    subdir: &Subdir,
    excluded: &[String],
) -> LocalMatch {
    let files = local_files(local_root, excluded);
    match_in(&files, upstream_path, subdir)
}

/// Same as [`find_local_match`] over an already enumerated file list.
pub fn match_in(files: &[PathBuf], upstream_path: &str, subdir: &Subdir) -> LocalMatch {
    let cleaned = clean(upstream_path, subdir);
    if cleaned.is_empty() {
        return LocalMatch::NotFound;
    }

    let mut candidates = files
        .iter()
        .filter(|file| normalize(&relative_key(file)).ends_with(&cleaned))
        .cloned();

    let Some(chosen) = candidates.next() else {
        log::debug!("No local match for {upstream_path}");
        return LocalMatch::NotFound;
    };

    let others: Vec<PathBuf> = candidates.collect();
    if others.is_empty() {
        log::debug!("{upstream_path} -> {}", chosen.display());
        LocalMatch::Unique(chosen)
    } else {
        log::warn!(
            "Ambiguous local match for {upstream_path}: using {} ({} other candidate(s))",
            chosen.display(),
            others.len()
        );
        LocalMatch::Ambiguous { chosen, others }
    }
}

/// Returns true if two paths collide under the suffix heuristic.
///
/// `local` is normalized first; `upstream_clean` must already be cleaned.
/// Matches in either direction, as used for the collision report.
pub fn suffix_collides(local: &str, upstream_clean: &str) -> bool {
    if upstream_clean.is_empty() {
        return false;
    }
    let normalized = normalize(local);
    normalized.ends_with(upstream_clean) || upstream_clean.ends_with(normalized.as_str())
}

// ============================================================================
// Tests
// ============================================================================
