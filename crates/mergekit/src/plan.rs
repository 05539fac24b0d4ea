//! Turning a change set into a merge plan.
//!
//! Every changed upstream path is mapped to its local file, the three
//! versions are fetched and the record is classified. Nothing is written
//! until [`apply_auto_updates`] is called.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::classify::{Classification, any_binary, classify_fetched};
use crate::error::{Error, Result};
use crate::fetch::{fetch_at, fetch_local};
use crate::mapper::{self, LocalMatch};
use crate::types::{ChangeSet, Revision, Side, Subdir};

/// Everything a reconciliation run needs to know about where things live.
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Root of the local chezmoi source tree (a git working tree)
    pub work_tree: PathBuf,
    /// Local clone of the upstream repository
    pub cache_repo: PathBuf,
    /// Branch or ref in `work_tree` holding the imported upstream files
    pub compare_ref: String,
    /// Part of the upstream repository that holds the dotfiles
    pub subdir: Subdir,
    /// Upstream revision at the previous sync, if there was one
    pub old: Option<Revision>,
    /// Upstream revision being synced to
    pub new: Revision,
    /// Directory names under `work_tree` never matched against
    pub excluded_dirs: Vec<String>,
}

/// A changed file whose local counterpart was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    /// Path in the upstream repository
    pub upstream: String,
    /// Path relative to the work tree
    pub local: PathBuf,
}

/// A file changed on both sides.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub upstream: String,
    pub local: PathBuf,
    #[serde(skip)]
    pub base: Vec<u8>,
    #[serde(skip)]
    pub yours: Vec<u8>,
    #[serde(skip)]
    pub theirs: Vec<u8>,
    /// Any of the three versions contains a NUL byte
    pub binary: bool,
    /// Upstream had no previous version; base is empty
    pub new_upstream: bool,
}

/// Why a changed upstream path was left out of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No local file corresponds to the path
    NotLocal,
    /// One side could not be read
    FetchUnavailable { side: Side },
}

/// A changed upstream path that will not be touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Excluded {
    pub upstream: String,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

impl Excluded {
    /// The error this exclusion stands for
    pub fn to_error(&self) -> Error {
        match self.reason {
            ExclusionReason::NotLocal => Error::UnresolvedLocalPath(self.upstream.clone()),
            ExclusionReason::FetchUnavailable { side } => Error::FetchUnavailable {
                path: self.upstream.clone(),
                side,
            },
        }
    }
}

/// An upstream path that matched more than one local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub upstream: String,
    pub chosen: PathBuf,
    pub others: Vec<PathBuf>,
}

/// Partition of a change set by what has to happen to each file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergePlan {
    pub skipped: Vec<PlannedFile>,
    pub auto_updates: Vec<PlannedFile>,
    pub conflicts: Vec<ConflictRecord>,
    pub excluded: Vec<Excluded>,
    pub ambiguous: Vec<Ambiguity>,
}

impl MergePlan {
    /// Returns true if no file needs to change
    pub fn is_noop(&self) -> bool {
        self.auto_updates.is_empty() && self.conflicts.is_empty()
    }

    fn exclude(&mut self, upstream: &str, reason: ExclusionReason) {
        log::debug!("Excluding {upstream}: {reason:?}");
        self.excluded.push(Excluded {
            upstream: upstream.to_string(),
            reason,
        });
    }
}

/// Map, fetch and classify every path in `changes`.
///
/// Per-file problems (no local match, unreadable content) become
/// exclusions; this function does not fail.
pub fn analyze(ctx: &SyncContext, backend: &dyn Backend, changes: &ChangeSet) -> MergePlan {
    let mut plan = MergePlan::default();
    if changes.is_empty() {
        return plan;
    }

    let local_files = mapper::local_files(&ctx.work_tree, &ctx.excluded_dirs);
    log::debug!(
        "Matching {} upstream path(s) against {} local file(s)",
        changes.len(),
        local_files.len()
    );

    for upstream in changes.iter() {
        let found = mapper::match_in(&local_files, upstream, &ctx.subdir);
        let local = match &found {
            LocalMatch::NotFound => {
                plan.exclude(upstream, ExclusionReason::NotLocal);
                continue;
            }
            LocalMatch::Unique(path) => path.clone(),
            LocalMatch::Ambiguous { chosen, others } => {
                plan.ambiguous.push(Ambiguity {
                    upstream: upstream.to_string(),
                    chosen: chosen.clone(),
                    others: others.clone(),
                });
                chosen.clone()
            }
        };

        let yours = fetch_local(&ctx.work_tree.join(&local));
        let theirs = fetch_at(backend, &ctx.cache_repo, Some(&ctx.new), upstream);
        let base = fetch_at(backend, &ctx.cache_repo, ctx.old.as_ref(), upstream);
        let Some(classification) = classify_fetched(&base, &yours, &theirs) else {
            let side = if yours.is_found() { Side::Theirs } else { Side::Yours };
            plan.exclude(upstream, ExclusionReason::FetchUnavailable { side });
            continue;
        };
        let new_upstream = !base.is_found();
        let base = base.into_bytes().unwrap_or_default();
        let yours = yours.into_bytes().unwrap_or_default();
        let theirs = theirs.into_bytes().unwrap_or_default();

        let file = PlannedFile {
            upstream: upstream.to_string(),
            local,
        };
        match classification {
            Classification::Skip => plan.skipped.push(file),
            Classification::AutoUpdate => plan.auto_updates.push(file),
            Classification::Conflict => plan.conflicts.push(ConflictRecord {
                binary: any_binary(&[&base, &yours, &theirs]),
                upstream: file.upstream,
                local: file.local,
                base,
                yours,
                theirs,
                new_upstream,
            }),
        }
    }

    log::info!(
        "Plan: {} up to date, {} auto-update(s), {} conflict(s), {} excluded",
        plan.skipped.len(),
        plan.auto_updates.len(),
        plan.conflicts.len(),
        plan.excluded.len()
    );
    plan
}

/// Overwrite every auto-updatable file from `compare_ref` in one checkout.
///
/// Returns the number of files updated.
pub fn apply_auto_updates(
    backend: &dyn Backend,
    ctx: &SyncContext,
    plan: &MergePlan,
) -> Result<usize> {
    if plan.auto_updates.is_empty() {
        return Ok(0);
    }
    let paths: Vec<&Path> = plan.auto_updates.iter().map(|f| f.local.as_path()).collect();
    backend.checkout_paths(&ctx.work_tree, &ctx.compare_ref, &paths)?;
    Ok(paths.len())
}
