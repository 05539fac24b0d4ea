use anyhow::{Context as _, Result};
use mergekit::plan::analyze;
use mergekit::{MergePlan, Revision, Summary};
use serde::Serialize;

use super::{Session, announce, report};
use crate::Context;
use crate::cli::StatusArgs;
use crate::ui;

/// Machine-readable status
#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    upstream: &'a str,
    branch: &'a str,
    old: Option<&'a Revision>,
    new: &'a Revision,
    /// `None` when the comparison branch does not exist yet
    summary: Option<&'a Summary>,
    plan: &'a MergePlan,
}

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let session = Session::open(&args.upstream)?;
    session.require_cache()?;

    let sync_ctx = session.sync_context()?;
    let changes = session.changes(&sync_ctx)?;
    let summary = if session.git.branch_exists(&session.root, &session.upstream.branch) {
        Some(session.summarize(&sync_ctx, &changes)?)
    } else {
        None
    };
    let plan = analyze(&sync_ctx, &session.git, &changes);

    if args.json {
        let report = StatusReport {
            upstream: &session.upstream.url,
            branch: &session.upstream.branch,
            old: sync_ctx.old.as_ref(),
            new: &sync_ctx.new,
            summary: summary.as_ref(),
            plan: &plan,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{json}");
        return Ok(());
    }

    ui::header(&format!("Upstream status: {}", session.upstream.name));
    announce(&sync_ctx);
    match &summary {
        Some(summary) => report::print_summary(summary, session.compare_url().as_deref()),
        None => ui::warn(&format!(
            "Comparison branch '{}' does not exist yet; run `dotmerge sync`",
            session.upstream.branch
        )),
    }

    report::print_plan(&plan, ctx.verbose > 0);
    if !ctx.quiet {
        report::print_exclusions(&plan);
    }
    Ok(())
}
