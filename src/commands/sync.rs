use anyhow::{Context as _, Result, bail};
use mergekit::SyncContext;
use std::path::Path;
use tempfile::TempDir;

use super::{ReconcileOptions, Session, announce, reconcile, report};
use crate::Context;
use crate::chezmoi;
use crate::cli::SyncArgs;
use crate::paths;
use crate::progress;
use crate::runner;
use crate::ui;

const TOTAL_STEPS: usize = 4;

pub fn run(_ctx: &Context, args: SyncArgs) -> Result<()> {
    let session = Session::open(&args.upstream)?;
    ui::header(&format!("Syncing {}", session.upstream.url));

    if !runner::command_exists("chezmoi") {
        bail!("chezmoi is not installed or not on PATH");
    }
    session.ensure_clean()?;
    let original = session.git.current_branch(&session.root)?;
    if original.is_empty() {
        bail!("HEAD is detached; check out your working branch first");
    }
    if original == session.upstream.branch {
        bail!(
            "Already on '{}'; switch to your working branch before syncing",
            original
        );
    }

    ui::step(1, TOTAL_STEPS, "Fetching upstream");
    session.fetch_upstream()?;
    let sync_ctx = session.sync_context()?;
    announce(&sync_ctx);
    let changes = session.changes(&sync_ctx)?;

    ui::step(2, TOTAL_STEPS, &format!("Importing into '{}'", session.upstream.branch));
    import_snapshot(&session, &sync_ctx, &original)?;

    if session.config.push && !args.no_push {
        let pb = progress::spinner(&format!("Pushing '{}'", session.upstream.branch));
        match session
            .git
            .push_force(&session.root, &session.config.remote, &session.upstream.branch)
        {
            Ok(()) => progress::finish_success(&pb, "Comparison branch pushed"),
            Err(e) => {
                progress::finish_warn(&pb, "Push failed; continuing with the local branch");
                log::warn!("push failed: {e}");
            }
        }
    }

    ui::step(3, TOTAL_STEPS, "Analyzing changes");
    let summary = session.summarize(&sync_ctx, &changes)?;
    report::print_summary(&summary, session.compare_url().as_deref());

    ui::step(4, TOTAL_STEPS, "Reconciling");
    reconcile(
        &session,
        &sync_ctx,
        &changes,
        &ReconcileOptions {
            assume_yes: args.yes,
            merge_tool: args.merge_tool,
        },
    )
}

/// Replace the comparison branch contents with the upstream snapshot.
///
/// Always tries to return to `original`, even when the import fails.
fn import_snapshot(session: &Session, ctx: &SyncContext, original: &str) -> Result<()> {
    let tmp = TempDir::new().context("Failed to create a temporary directory")?;
    let tarball = tmp.path().join("upstream.tar");
    let treeish = ctx.subdir.treeish(ctx.new.as_str());
    session
        .git
        .archive(&session.cache, &treeish, &tarball)
        .with_context(|| format!("Failed to archive {treeish}"))?;

    session
        .git
        .checkout_branch(&session.root, &session.upstream.branch, true)?;

    let imported = populate_branch(session, &tarball);
    let returned = session.git.checkout_branch(&session.root, original, false);

    match (imported, returned) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(e),
        (imported, Err(e)) => {
            if let Err(import_err) = imported {
                ui::error(&format!("{import_err:#}"));
            }
            Err(e).with_context(|| {
                format!(
                    "Could not switch back to '{original}'; you are still on '{}'",
                    session.upstream.branch
                )
            })
        }
    }
}

fn populate_branch(session: &Session, tarball: &Path) -> Result<()> {
    let removed = chezmoi::clean_source_tree(&session.root, &session.own_paths())?;
    for path in &removed {
        log::debug!("Removed {}", paths::display_relative(path, &session.root));
    }
    log::info!("Removed {} managed entries before import", removed.len());

    chezmoi::import(&session.root, &session.config.destination_path(), tarball)?;

    session.git.add_all(&session.root, &session.own_paths())?;
    session
        .git
        .commit(&session.root, &format!("Import from {}", session.upstream.url))?;
    ui::success(&format!("Imported upstream into '{}'", session.upstream.branch));
    Ok(())
}
