//! Summary of what an import brought in.
//!
//! Compares the work tree's `HEAD` with the comparison branch and flags
//! files that changed on both sides. Rendering is left to the caller.

use serde::Serialize;
use std::path::Path;

use crate::backend::Backend;
use crate::error::Result;
use crate::mapper;
use crate::types::{ChangeSet, Subdir};

/// Number of deleted files listed before the rest are summarized
pub const DELETED_DISPLAY_LIMIT: usize = 10;

/// A locally modified file that also changed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    /// Path in the work tree
    pub local: String,
    /// Upstream path it collides with
    pub upstream: String,
}

/// Everything the summary screen shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Upstream paths changed since the last sync, sorted
    pub upstream: Vec<String>,
    /// Files the comparison branch adds
    pub added: Vec<String>,
    /// Files the comparison branch changes
    pub modified: Vec<String>,
    /// Files the comparison branch does not have
    pub deleted: Vec<String>,
    pub collisions: Vec<Collision>,
}

impl Summary {
    /// Deleted files to list, and how many more were left out
    pub fn deleted_preview(&self) -> (&[String], usize) {
        let shown = self.deleted.len().min(DELETED_DISPLAY_LIMIT);
        (&self.deleted[..shown], self.deleted.len() - shown)
    }
}

/// Build the summary for `work_tree` against `compare_ref`.
pub fn summarize(
    backend: &dyn Backend,
    work_tree: &Path,
    compare_ref: &str,
    upstream: &ChangeSet,
    subdir: &Subdir,
) -> Result<Summary> {
    let mut summary = Summary {
        upstream: upstream.iter().map(str::to_string).collect(),
        ..Summary::default()
    };

    for (status, path) in backend.name_status(work_tree, "HEAD", compare_ref)? {
        match status.chars().next() {
            Some('A' | 'R' | 'C') => summary.added.push(path),
            Some('M') => summary.modified.push(path),
            Some('D') => summary.deleted.push(path),
            _ => log::debug!("Ignoring status {status} for {path}"),
        }
    }

    let cleaned: Vec<(&str, String)> = upstream
        .iter()
        .map(|path| (path, mapper::clean(path, subdir)))
        .collect();
    for local in &summary.modified {
        if let Some((path, _)) = cleaned
            .iter()
            .find(|(_, clean)| mapper::suffix_collides(local, clean))
        {
            summary.collisions.push(Collision {
                local: local.clone(),
                upstream: (*path).to_string(),
            });
        }
    }
    summary.collisions.sort_by(|a, b| a.local.cmp(&b.local));

    Ok(summary)
}

/// Browser URL comparing `branch` on the hosting service.
///
/// SSH remotes (`git@host:owner/repo.git`, `ssh://git@host/owner/repo`)
/// are rewritten to https. Returns `None` for remotes that are not
/// recognizable web hosts, such as local paths.
pub fn compare_url(remote: &str, branch: &str) -> Option<String> {
    let remote = remote.trim();
    let base = if let Some(rest) = remote.strip_prefix("git@") {
        format!("https://{}", rest.replacen(':', "/", 1))
    } else if let Some(rest) = remote.strip_prefix("ssh://") {
        let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
        format!("https://{rest}")
    } else if remote.starts_with("https://") || remote.starts_with("http://") {
        remote.to_string()
    } else {
        return None;
    };

    let base = base.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    Some(format!("{base}/compare/{branch}?expand=1"))
}
