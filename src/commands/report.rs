//! Terminal rendering of summaries, plans and diffs.

use colored::Colorize;
use mergekit::MergePlan;
use mergekit::report::Summary;
use mergekit::resolver::Resolved;
use mergekit::{ResolveOutcome, plan::ExclusionReason};
use similar::{ChangeTag, TextDiff};

use crate::ui;

const RULE_WIDTH: usize = 60;

/// A zero-context line diff ready to print.
#[derive(Debug, PartialEq, Eq)]
pub enum Delta {
    /// Both sides are the same text
    Identical,
    /// One side is not valid UTF-8
    Undecodable,
    /// Hunk headers and changed lines, in order
    Lines(Vec<DeltaLine>),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeltaLine {
    Hunk(String),
    Removed(String),
    Added(String),
}

/// Compute the line diff from `a` to `b` without context lines.
pub fn delta(a: &[u8], b: &[u8]) -> Delta {
    let (Ok(a), Ok(b)) = (std::str::from_utf8(a), std::str::from_utf8(b)) else {
        return Delta::Undecodable;
    };

    let diff = TextDiff::from_lines(a, b);
    let mut lines = Vec::new();
    for hunk in diff.unified_diff().context_radius(0).iter_hunks() {
        lines.push(DeltaLine::Hunk(hunk.header().to_string().trim_end().to_string()));
        for change in hunk.iter_changes() {
            let text = change.value().trim_end_matches(['\n', '\r']).to_string();
            match change.tag() {
                ChangeTag::Delete => lines.push(DeltaLine::Removed(text)),
                ChangeTag::Insert => lines.push(DeltaLine::Added(text)),
                ChangeTag::Equal => {}
            }
        }
    }

    if lines.is_empty() {
        Delta::Identical
    } else {
        Delta::Lines(lines)
    }
}

/// Print the diff from `a` to `b` under `label`
pub fn print_delta(label: &str, a: &[u8], b: &[u8]) {
    println!();
    println!("{}", format!("--- {label} ---").bold());
    match delta(a, b) {
        Delta::Identical => ui::dim("(No text changes detected)"),
        Delta::Undecodable => ui::dim("(Diff unavailable - encoding issue)"),
        Delta::Lines(lines) => {
            for line in lines {
                match line {
                    DeltaLine::Hunk(header) => println!("{}", header.cyan()),
                    DeltaLine::Removed(text) => println!("{}", format!("-{text}").red()),
                    DeltaLine::Added(text) => println!("{}", format!("+{text}").green()),
                }
            }
        }
    }
}

pub fn print_binary_notice() {
    ui::dim("[Binary file - diff unavailable]");
}

/// Print the analysis summary
pub fn print_summary(summary: &Summary, compare_url: Option<&str>) {
    println!();
    println!("{}", "=".repeat(RULE_WIDTH).dimmed());
    println!("{}", format!("{:^width$}", "ANALYSIS SUMMARY", width = RULE_WIDTH).bold());
    println!("{}", "=".repeat(RULE_WIDTH).dimmed());

    if summary.upstream.is_empty() {
        ui::section("Upstream status");
        ui::dim("No new changes in the upstream repository.");
    } else {
        ui::section(&format!(
            "Fresh upstream updates ({})",
            summary.upstream.len()
        ));
        ui::dim("These files changed upstream since the last sync");
        for path in &summary.upstream {
            ui::item("*", path);
        }
    }

    if !summary.added.is_empty() {
        ui::section(&format!("New files ({})", summary.added.len()));
        for path in &summary.added {
            ui::item(&"+".green().to_string(), path);
        }
    }

    if !summary.modified.is_empty() {
        ui::section(&format!("Modified files ({})", summary.modified.len()));
        for path in &summary.modified {
            ui::item(&"~".yellow().to_string(), path);
        }
    }

    if !summary.deleted.is_empty() {
        ui::section(&format!("Missing upstream ({})", summary.deleted.len()));
        let (shown, more) = summary.deleted_preview();
        for path in shown {
            ui::item(&"-".red().to_string(), path);
        }
        if more > 0 {
            ui::dim(&format!("... and {more} more"));
        }
    }

    if !summary.collisions.is_empty() {
        ui::banner("ATTENTION REQUIRED: MODIFIED LOCALLY & UPDATED UPSTREAM");
        for collision in &summary.collisions {
            ui::item(
                &"!!".red().to_string(),
                &format!("{} ({})", collision.local, collision.upstream.dimmed()),
            );
        }
    }

    if let Some(url) = compare_url {
        println!();
        println!("{}", "=".repeat(RULE_WIDTH).dimmed());
        println!("{} {}", "COMPARE HERE:".bold(), url.cyan().underline());
        println!("{}", "=".repeat(RULE_WIDTH).dimmed());
    }
}

/// Print how the changed files were classified
pub fn print_plan(plan: &MergePlan, show_skipped: bool) {
    ui::section("Classification");
    ui::kv("Up to date", &plan.skipped.len().to_string());
    ui::kv("Auto-update", &plan.auto_updates.len().to_string());
    ui::kv("Conflicts", &plan.conflicts.len().to_string());
    ui::kv("Excluded", &plan.excluded.len().to_string());

    if show_skipped {
        for file in &plan.skipped {
            ui::item(&"=".dimmed().to_string(), &file.local.display().to_string());
        }
    }
    for file in &plan.auto_updates {
        ui::item(&"↓".green().to_string(), &file.local.display().to_string());
    }
    for record in &plan.conflicts {
        let kind = if record.binary { " (binary)" } else { "" };
        ui::item(
            &"!".yellow().to_string(),
            &format!("{}{}", record.local.display(), kind.dimmed()),
        );
    }
}

/// List files left out of the run and matches that were ambiguous
pub fn print_exclusions(plan: &MergePlan) {
    if !plan.ambiguous.is_empty() {
        ui::section("Ambiguous matches");
        for ambiguity in &plan.ambiguous {
            let others: Vec<String> = ambiguity
                .others
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            ui::item(
                &"?".yellow().to_string(),
                &format!(
                    "{} -> {} (also: {})",
                    ambiguity.upstream,
                    ambiguity.chosen.display(),
                    others.join(", ")
                ),
            );
        }
    }

    if !plan.excluded.is_empty() {
        ui::section("Excluded");
        for excluded in &plan.excluded {
            let reason = match excluded.reason {
                ExclusionReason::NotLocal => "no local file".to_string(),
                ExclusionReason::FetchUnavailable { side } => format!("{side} version unavailable"),
            };
            ui::item(
                &"-".dimmed().to_string(),
                &format!("{} ({})", excluded.upstream, reason.dimmed()),
            );
        }
    }
}

/// Print the outcome of every resolved conflict
pub fn print_outcomes(resolved: &[Resolved]) {
    if resolved.is_empty() {
        return;
    }
    ui::section("Conflicts");
    for entry in resolved {
        let local = entry.local.display().to_string();
        match &entry.outcome {
            ResolveOutcome::KeptYours => ui::item(&"=".dimmed().to_string(), &format!("{local} (kept yours)")),
            ResolveOutcome::TookTheirs => {
                ui::item(&"↓".green().to_string(), &format!("{local} (took theirs)"));
            }
            ResolveOutcome::Clean => ui::item(&"✓".green().to_string(), &format!("{local} (merged)")),
            ResolveOutcome::Marked => {
                ui::item(&"✎".yellow().to_string(), &format!("{local} (merged by hand)"));
            }
            ResolveOutcome::Failed(reason) => {
                ui::item(&"✗".red().to_string(), &format!("{local} ({reason})"));
            }
        }
    }
}
