use anyhow::Result;

use super::{ReconcileOptions, Session, announce, reconcile, report};
use crate::Context;
use crate::cli::MergeArgs;
use crate::ui;

pub fn run(_ctx: &Context, args: MergeArgs) -> Result<()> {
    let session = Session::open(&args.upstream)?;
    ui::header(&format!("Reconciling '{}'", session.upstream.branch));

    session.require_compare_branch()?;
    session.require_cache()?;
    session.ensure_clean()?;

    let sync_ctx = session.sync_context()?;
    announce(&sync_ctx);
    let changes = session.changes(&sync_ctx)?;
    let summary = session.summarize(&sync_ctx, &changes)?;
    report::print_summary(&summary, session.compare_url().as_deref());

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
