//! Subcommands and the setup they share.

pub mod check;
pub mod config;
pub mod merge;
pub mod report;
pub mod status;
pub mod sync;

use anyhow::{Context as _, Result, bail};
use mergekit::backend::Backend;
use mergekit::backend::git::GitBackend;
use mergekit::merge::has_markers;
use mergekit::plan::{analyze, apply_auto_updates};
use mergekit::report::summarize;
use mergekit::resolver::{ResolveRun, Resolved};
use mergekit::{
    BuiltinMerger, ChangeSet, GitMergeFile, MergePlan, ResolveOutcome, Resolver, Subdir, Summary,
    SyncContext, TextMerger,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::cli::UpstreamArgs;
use crate::config::{DotmergeConfig, MergeTool};
use crate::paths;
use crate::progress;
use crate::prompt::{self, EditorLauncher, TerminalPrompter};
use crate::state::SyncMarker;
use crate::ui;

/// Upstream settings after merging CLI flags over the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub url: String,
    pub name: String,
    pub subdir: Subdir,
    pub branch: String,
}

impl Upstream {
    /// CLI flags win over config values
    pub fn resolve(config: &DotmergeConfig, args: &UpstreamArgs) -> Result<Self> {
        let Some(url) = args.repo.clone().or_else(|| config.upstream.clone()) else {
            bail!("No upstream repository: pass --repo or set `upstream` in the config file");
        };
        let name = paths::repo_name(&url)
            .with_context(|| format!("Cannot derive a directory name from '{url}'"))?;
        let subdir = args
            .path
            .as_deref()
            .or(config.subdir.as_deref())
            .map(Subdir::parse)
            .unwrap_or_default();
        let branch = args.branch.clone().unwrap_or_else(|| config.branch.clone());
        if branch.trim().is_empty() {
            bail!("Comparison branch name must not be empty");
        }

        Ok(Self {
            url,
            name,
            subdir,
            branch,
        })
    }
}

/// Everything a command needs once it knows where it is running.
pub struct Session {
    pub config: DotmergeConfig,
    pub git: GitBackend,
    pub upstream: Upstream,
    /// Root of the chezmoi source working tree
    pub root: PathBuf,
    /// Local clone of the upstream repository
    pub cache: PathBuf,
    pub marker: SyncMarker,
}

impl Session {
    /// Load config, locate the working tree and resolve the upstream
    pub fn open(args: &UpstreamArgs) -> Result<Self> {
        let config = DotmergeConfig::load()?;
        let upstream = Upstream::resolve(&config, args)?;
        let git = mergekit::backend::default_backend()?;

        let cwd = std::env::current_dir().context("Could not determine current directory")?;
        let root = git
            .toplevel(&cwd)
            .context("Not inside a git repository; run dotmerge from your chezmoi source")?;
        let cache = root.join(&config.external_dir).join(&upstream.name);
        let marker = SyncMarker::new(&root, &config.marker_file);

        log::debug!("Source tree: {}", root.display());
        log::debug!("Upstream cache: {}", cache.display());

        Ok(Self {
            config,
            git,
            upstream,
            root,
            cache,
            marker,
        })
    }

    /// Paths under the root that belong to dotmerge itself
    pub fn own_paths(&self) -> [&str; 2] {
        [
            self.config.marker_file.as_str(),
            self.config.external_dir.as_str(),
        ]
    }

    /// Refuse to continue with uncommitted changes outside dotmerge's own files
    pub fn ensure_clean(&self) -> Result<()> {
        let dirty = self.git.dirty_paths(&self.root)?;
        let dirty = unrelated_changes(&dirty, &self.own_paths());
        if dirty.is_empty() {
            return Ok(());
        }
        for path in dirty.iter().take(10) {
            ui::dim(path);
        }
        bail!(
            "Working tree has uncommitted changes ({}); commit or stash them first",
            ui::plural(dirty.len(), "path")
        )
    }

    /// Clone or fast-forward the upstream cache
    pub fn fetch_upstream(&self) -> Result<()> {
        let pb = progress::spinner(&format!("Fetching {}", self.upstream.url));
        match self.git.clone_or_update(&self.upstream.url, &self.cache) {
            Ok(()) => {
                progress::finish_success(&pb, &format!("Upstream {} is current", self.upstream.name));
                Ok(())
            }
            Err(e) => {
                progress::finish_error(&pb, &format!("Could not fetch {}", self.upstream.url));
                Err(e).context("Failed to update upstream cache")
            }
        }
    }

    /// Fail unless the upstream cache has been cloned.
    ///
    /// Commands working against an existing import use the cache as is, so
    /// the revisions they compare match what was imported.
    pub fn require_cache(&self) -> Result<()> {
        if self.cache.join(".git").exists() {
            Ok(())
        } else {
            bail!(
                "No upstream cache at {}; run `dotmerge sync` first",
                self.cache.display()
            )
        }
    }

    /// Build the reconciliation context from the marker and the cache head
    pub fn sync_context(&self) -> Result<SyncContext> {
        let old = self.marker.load()?;
        let new = self
            .git
            .current_revision(&self.cache)
            .context("Upstream cache has no commits")?;

        Ok(SyncContext {
            work_tree: self.root.clone(),
            cache_repo: self.cache.clone(),
            compare_ref: self.upstream.branch.clone(),
            subdir: self.upstream.subdir.clone(),
            old,
            new,
            excluded_dirs: vec![self.config.external_dir.clone()],
        })
    }

    /// Upstream paths changed since the last sync
    pub fn changes(&self, ctx: &SyncContext) -> Result<ChangeSet> {
        let changes = mergekit::differ::changed_paths(
            &self.git,
            &ctx.cache_repo,
            ctx.old.as_ref(),
            Some(&ctx.new),
            &ctx.subdir,
        )?;
        Ok(changes)
    }

    /// Fail unless the comparison branch has been created
    pub fn require_compare_branch(&self) -> Result<()> {
        if self.git.branch_exists(&self.root, &self.upstream.branch) {
            Ok(())
        } else {
            bail!(
                "Comparison branch '{}' does not exist; run `dotmerge sync` first",
                self.upstream.branch
            )
        }
    }

    pub fn summarize(&self, ctx: &SyncContext, changes: &ChangeSet) -> Result<Summary> {
        let summary = summarize(&self.git, &self.root, &ctx.compare_ref, changes, &ctx.subdir)
            .context("Failed to compare the working tree with the comparison branch")?;
        Ok(summary)
    }

    /// Web URL comparing the branch on the hosting service, if there is one
    pub fn compare_url(&self) -> Option<String> {
        let remote = self.git.remote_url(&self.root, &self.config.remote)?;
        mergekit::report::compare_url(&remote, &self.upstream.branch)
    }

    fn merger(&self, override_tool: Option<MergeTool>) -> Box<dyn TextMerger> {
        match override_tool.unwrap_or(self.config.merge_tool) {
            MergeTool::Git => Box::new(GitMergeFile::default()),
            MergeTool::Builtin => Box::new(BuiltinMerger),
        }
    }
}

/// Tell the operator which revisions are being compared
pub fn announce(ctx: &SyncContext) {
    match &ctx.old {
        Some(old) if *old == ctx.new => {
            ui::info(&format!("Upstream unchanged at {}", ctx.new.short()));
        }
        Some(old) => ui::info(&format!("Upstream {} -> {}", old.short(), ctx.new.short())),
        None => ui::info(&format!(
            "First sync; treating every upstream file at {} as changed",
            ctx.new.short()
        )),
    }
}

/// Dirty paths that are not under any of `own`
fn unrelated_changes(dirty: &[String], own: &[&str]) -> Vec<String> {
    dirty
        .iter()
        .filter(|path| {
            let path = path.trim_end_matches('/');
            !own.iter().any(|own| {
                let own = own.trim_matches('/');
                path == own || Path::new(path).starts_with(own)
            })
        })
        .cloned()
        .collect()
}

/// Options for the merge phase
pub struct ReconcileOptions {
    pub assume_yes: bool,
    pub merge_tool: Option<MergeTool>,
}

/// Auto-update, resolve conflicts, then record the synced revision.
///
/// The marker is only advanced when every file was dealt with; see
/// `is_complete`. If a prompt fails midway the outcomes gathered so far
/// are still reported before the error is returned.
pub fn reconcile(
    session: &Session,
    ctx: &SyncContext,
    changes: &ChangeSet,
    options: &ReconcileOptions,
) -> Result<()> {
    let plan = analyze(ctx, &session.git, changes);
    report::print_plan(&plan, false);

    if plan.is_noop() {
        report::print_exclusions(&plan);
        println!();
        ui::success("Nothing to reconcile");
        return finish(session, ctx, true, !options.assume_yes);
    }

    let auto_ok = match apply_auto_updates(&session.git, ctx, &plan) {
        Ok(0) => true,
        Ok(n) => {
            ui::success(&format!("Auto-updated {}", ui::plural(n, "file")));
            true
        }
        Err(e) => {
            ui::error(&format!("Auto-update failed: {e}"));
            false
        }
    };

    let run = resolve_conflicts(session, ctx, &plan, options)?;

    report::print_outcomes(&run.resolved);
    report::print_exclusions(&plan);

    let failed = run
        .resolved
        .iter()
        .filter(|r| matches!(r.outcome, ResolveOutcome::Failed(_)))
        .count();
    if failed > 0 {
        ui::warn(&format!(
            "{} could not be resolved; see above",
            ui::plural(failed, "file")
        ));
    }
    let leftover = leftover_markers(&session.root, &run.resolved);
    for path in &leftover {
        ui::warn(&format!("{} still contains conflict markers", path.display()));
    }
    let changed = run.resolved.iter().filter(|r| r.outcome.changed_file()).count();
    if changed > 0 {
        ui::info(&format!(
            "{} changed by conflict resolution; review and commit when ready",
            ui::plural(changed, "file")
        ));
    }

    let complete = is_complete(&plan, auto_ok, &run, &leftover);
    finish(
        session,
        ctx,
        complete,
        !options.assume_yes && run.aborted.is_none(),
    )?;

    match run.aborted {
        Some(e) => Err(anyhow::Error::new(e).context("Conflict resolution aborted")),
        None => Ok(()),
    }
}

/// Whether a run dealt with every file, so the marker may advance.
///
/// Any of these keeps the marker in place so the next run sees the same
/// changes again: a failed auto-update batch, conflicts left unresolved
/// (postponed, or cut short by an aborted prompt), a resolution that
/// failed, a hand-merged file that still holds conflict markers.
/// Exclusions and ambiguous matches do not; rerunning cannot change them.
fn is_complete(plan: &MergePlan, auto_ok: bool, run: &ResolveRun, leftover: &[PathBuf]) -> bool {
    auto_ok
        && run.finished(plan.conflicts.len())
        && !run
            .resolved
            .iter()
            .any(|r| matches!(r.outcome, ResolveOutcome::Failed(_)))
        && leftover.is_empty()
}

/// Conflicts outside a terminal, or when the operator declines, are left
/// for a later run and come back as an empty [`ResolveRun`].
fn resolve_conflicts(
    session: &Session,
    ctx: &SyncContext,
    plan: &MergePlan,
    options: &ReconcileOptions,
) -> Result<ResolveRun> {
    if plan.conflicts.is_empty() {
        return Ok(ResolveRun::default());
    }

    let count = ui::plural(plan.conflicts.len(), "conflict");
    if !std::io::stdin().is_terminal() {
        ui::warn(&format!("Not a terminal; leaving {count} for an interactive run"));
        return Ok(ResolveRun::default());
    }
    if !prompt::confirm(&format!("Resolve {count} now?"), true, options.assume_yes)? {
        ui::info(&format!("Leaving {count} for later"));
        return Ok(ResolveRun::default());
    }

    let merger = session.merger(options.merge_tool);
    let resolver = Resolver::new(&session.git, merger.as_ref(), ctx);
    let mut prompter = TerminalPrompter::default();
    let mut editor = EditorLauncher::new(session.config.editor());

    Ok(resolver.resolve_all(&plan.conflicts, &mut prompter, &mut editor))
}

/// Hand-merged files whose markers were not all removed
fn leftover_markers(root: &Path, resolved: &[Resolved]) -> Vec<PathBuf> {
    resolved
        .iter()
        .filter(|r| r.outcome == ResolveOutcome::Marked)
        .filter(|r| {
            std::fs::read(root.join(&r.local)).is_ok_and(|content| has_markers(&content))
        })
        .map(|r| r.local.clone())
        .collect()
}

fn finish(session: &Session, ctx: &SyncContext, complete: bool, offer_diff: bool) -> Result<()> {
    println!();
    if complete {
        session.marker.save(&ctx.new)?;
        ui::success(&format!("Recorded upstream revision {}", ctx.new.short()));
    } else {
        ui::warn(&format!(
            "Upstream revision {} not recorded; rerun to finish reconciling",
            ctx.new.short()
        ));
    }

    if !offer_diff || !std::io::stdin().is_terminal() {
        return Ok(());
    }
    if prompt::confirm("Show the final 'chezmoi diff'?", false, false)? {
        if let Err(e) = crate::chezmoi::diff(&session.root) {
            ui::warn(&format!("{e:#}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(repo: Option<&str>, path: Option<&str>, branch: Option<&str>) -> UpstreamArgs {
        UpstreamArgs {
            repo: repo.map(str::to_string),
            path: path.map(str::to_string),
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn test_upstream_flags_override_config() {
        let config = DotmergeConfig {
            upstream: Some("https://example.com/me/base-dots.git".to_string()),
            subdir: Some("home".to_string()),
            ..DotmergeConfig::default()
        };

        let from_config = Upstream::resolve(&config, &args(None, None, None)).unwrap();
        assert_eq!(from_config.name, "base-dots");
        assert_eq!(from_config.subdir, Subdir::parse("home"));
        assert_eq!(from_config.branch, "compare-external");

        let overridden = Upstream::resolve(
            &config,
            &args(Some("git@github.com:me/other.git"), Some("."), Some("view")),
        )
        .unwrap();
        assert_eq!(overridden.url, "git@github.com:me/other.git");
        assert_eq!(overridden.name, "other");
        assert!(overridden.subdir.is_root());
        assert_eq!(overridden.branch, "view");
    }

    #[test]
    fn test_upstream_requires_repo() {
        let err = Upstream::resolve(&DotmergeConfig::default(), &args(None, None, None))
            .unwrap_err();
        assert!(err.to_string().contains("--repo"));
        assert!(Upstream::resolve(&DotmergeConfig::default(), &args(Some("/"), None, None)).is_err());
        assert!(
            Upstream::resolve(&DotmergeConfig::default(), &args(Some("x/dots"), None, Some(" ")))
                .is_err()
        );
    }

    #[test]
    fn test_leftover_markers_only_checks_hand_merged_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marked = "<<<<<<< current\na\n=======\nb\n>>>>>>> incoming\n";
        std::fs::write(tmp.path().join("dot_a"), marked).unwrap();
        std::fs::write(tmp.path().join("dot_b"), "resolved\n").unwrap();
        std::fs::write(tmp.path().join("dot_c"), marked).unwrap();

        let entry = |local: &str, outcome| Resolved {
            upstream: local.to_string(),
            local: PathBuf::from(local),
            outcome,
        };
        let resolved = vec![
            entry("dot_a", ResolveOutcome::Marked),
            entry("dot_b", ResolveOutcome::Marked),
            entry("dot_c", ResolveOutcome::KeptYours),
            entry("dot_missing", ResolveOutcome::Marked),
        ];
        assert_eq!(
            leftover_markers(tmp.path(), &resolved),
            vec![PathBuf::from("dot_a")]
        );
    }

    fn conflict(local: &str) -> mergekit::ConflictRecord {
        mergekit::ConflictRecord {
            upstream: local.replace("dot_", "."),
            local: PathBuf::from(local),
            base: b"x\ny\n".to_vec(),
            yours: b"x\nQ\n".to_vec(),
            theirs: b"x\nz\n".to_vec(),
            binary: false,
            new_upstream: false,
        }
    }

    fn outcome(local: &str, outcome: ResolveOutcome) -> Resolved {
        Resolved {
            upstream: local.replace("dot_", "."),
            local: PathBuf::from(local),
            outcome,
        }
    }

    fn two_conflicts() -> MergePlan {
        MergePlan {
            conflicts: vec![conflict("dot_a"), conflict("dot_b")],
            ..MergePlan::default()
        }
    }

    fn finished_run() -> ResolveRun {
        ResolveRun {
            resolved: vec![
                outcome("dot_a", ResolveOutcome::TookTheirs),
                outcome("dot_b", ResolveOutcome::Clean),
            ],
            aborted: None,
        }
    }

    #[test]
    fn test_complete_when_everything_was_handled() {
        assert!(is_complete(&two_conflicts(), true, &finished_run(), &[]));
        assert!(is_complete(&MergePlan::default(), true, &ResolveRun::default(), &[]));
    }

    #[test]
    fn test_exclusions_do_not_hold_back_marker() {
        let mut plan = two_conflicts();
        plan.excluded.push(mergekit::plan::Excluded {
            upstream: ".profile".to_string(),
            reason: mergekit::plan::ExclusionReason::NotLocal,
        });
        assert!(is_complete(&plan, true, &finished_run(), &[]));
    }

    #[test]
    fn test_failed_auto_update_holds_back_marker() {
        assert!(!is_complete(&two_conflicts(), false, &finished_run(), &[]));
        assert!(!is_complete(&MergePlan::default(), false, &ResolveRun::default(), &[]));
    }

    #[test]
    fn test_postponed_conflicts_hold_back_marker() {
        assert!(!is_complete(&two_conflicts(), true, &ResolveRun::default(), &[]));
    }

    #[test]
    fn test_aborted_prompt_holds_back_marker() {
        let run = ResolveRun {
            resolved: vec![outcome("dot_a", ResolveOutcome::TookTheirs)],
            aborted: Some(mergekit::Error::Prompt("input closed".to_string())),
        };
        assert!(!is_complete(&two_conflicts(), true, &run, &[]));
    }

    #[test]
    fn test_failed_resolution_holds_back_marker() {
        let run = ResolveRun {
            resolved: vec![
                outcome("dot_a", ResolveOutcome::Failed("checkout refused".to_string())),
                outcome("dot_b", ResolveOutcome::KeptYours),
            ],
            aborted: None,
        };
        assert!(!is_complete(&two_conflicts(), true, &run, &[]));
    }

    #[test]
    fn test_leftover_markers_hold_back_marker() {
        let run = ResolveRun {
            resolved: vec![
                outcome("dot_a", ResolveOutcome::Marked),
                outcome("dot_b", ResolveOutcome::KeptYours),
            ],
            aborted: None,
        };
        assert!(!is_complete(
            &two_conflicts(),
            true,
            &run,
            &[PathBuf::from("dot_a")]
        ));
        assert!(is_complete(&two_conflicts(), true, &run, &[]));
    }

    #[test]
    fn test_unrelated_changes_ignores_own_paths() {
        let dirty = vec![
            ".dotmerge-revision".to_string(),
            ".external_sources/".to_string(),
            ".external_sources/dots/file".to_string(),
            "dot_bashrc".to_string(),
            ".external_sources_old".to_string(),
        ];
        assert_eq!(
            unrelated_changes(&dirty, &[".dotmerge-revision", ".external_sources"]),
            vec!["dot_bashrc".to_string(), ".external_sources_old".to_string()]
        );
    }
}
