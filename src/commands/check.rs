use anyhow::Result;
use colored::Colorize;
use mergekit::backend::git::GitBackend;
use std::path::{Path, PathBuf};

use super::unrelated_changes;
use crate::Context;
use crate::config::DotmergeConfig;
use crate::runner;
use crate::state::SyncMarker;
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    fix: Option<String>,
}

fn pass(label: &str, detail: &str) {
    println!("  {} {} - {}", "✓".green(), label, detail.dimmed());
}

fn fail(label: &str, detail: &str) {
    println!("  {} {} - {}", "✗".red(), label, detail);
}

pub fn run(_ctx: &Context) -> Result<()> {
    ui::header("dotmerge Health Check");

    let mut issues: Vec<Issue> = Vec::new();

    check_commands(&mut issues);
    let config = check_config(&mut issues);
    if let Some(root) = check_work_tree(&config, &mut issues) {
        check_sync_state(&config, &root);
    }

    ui::section("Editor");
    pass(&config.editor(), "used when a merge leaves conflict markers");

    println!();
    if issues.is_empty() {
        ui::success("Ready to sync");
    } else {
        print_issue_summary(&issues);
    }
    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let label = if issues.len() == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{} {label} Found", issues.len()));

    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}  {} {}",
            format!("{}.", i + 1).bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
    }
}

fn check_commands(issues: &mut Vec<Issue>) {
    ui::section("Required Commands");

    let commands = [
        ("git", "version control and merge-file"),
        ("chezmoi", "imports upstream snapshots"),
    ];
    for (cmd, desc) in commands {
        if runner::command_exists(cmd) {
            let version = runner::run_capture_in(Path::new("."), cmd, &["--version"])
                .ok()
                .and_then(|v| v.lines().next().map(str::to_string))
                .unwrap_or_default();
            pass(cmd, format!("{desc} {version}").trim_end());
        } else {
            fail(cmd, &format!("{desc} {}", "(missing)".red()));
            issues.push(Issue {
                category: "Required Commands",
                summary: format!("{cmd} is not installed"),
                fix: Some(format!("Install {cmd} and make sure it is on PATH")),
            });
        }
    }
}

fn check_config(issues: &mut Vec<Issue>) -> DotmergeConfig {
    ui::section("Configuration");

    match DotmergeConfig::path() {
        Ok(path) if path.exists() => pass("config", &path.display().to_string()),
        Ok(path) => pass("config", &format!("{} (not present, using defaults)", path.display())),
        Err(e) => {
            fail("config", &e.to_string());
            issues.push(Issue {
                category: "Configuration",
                summary: "Could not determine config directory".to_string(),
                fix: Some("Set $HOME or DOTMERGE_CONFIG_DIR".to_string()),
            });
        }
    }

    match DotmergeConfig::load() {
        Ok(config) => {
            match &config.upstream {
                Some(url) => pass("upstream", url),
                None => pass("upstream", "not set; pass --repo"),
            }
            config
        }
        Err(e) => {
            fail("config", &format!("{e:#}"));
            issues.push(Issue {
                category: "Configuration",
                summary: "Config file is invalid".to_string(),
                fix: Some("Fix the file or run `dotmerge config init --force`".to_string()),
            });
            DotmergeConfig::default()
        }
    }
}

fn check_work_tree(config: &DotmergeConfig, issues: &mut Vec<Issue>) -> Option<PathBuf> {
    ui::section("Source Tree");

    let git = GitBackend::new().ok()?;
    let cwd = std::env::current_dir().ok()?;
    let root = match git.toplevel(&cwd) {
        Ok(root) => root,
        Err(_) => {
            fail("repository", "not inside a git repository");
            issues.push(Issue {
                category: "Source Tree",
                summary: "Current directory is not a git working tree".to_string(),
                fix: Some("cd \"$(chezmoi source-path)\"".to_string()),
            });
            return None;
        }
    };
    pass("repository", &root.display().to_string());

    match git.current_branch(&root) {
        Ok(branch) if branch.is_empty() => {
            fail("branch", "HEAD is detached");
            issues.push(Issue {
                category: "Source Tree",
                summary: "HEAD is detached".to_string(),
                fix: Some("git switch <your branch>".to_string()),
            });
        }
        Ok(branch) => pass("branch", &branch),
        Err(e) => fail("branch", &e.to_string()),
    }

    let own = [config.marker_file.as_str(), config.external_dir.as_str()];
    match git.dirty_paths(&root).map(|dirty| unrelated_changes(&dirty, &own)) {
        Ok(dirty) if dirty.is_empty() => pass("working tree", "clean"),
        Ok(dirty) => {
            fail("working tree", &ui::plural(dirty.len(), "uncommitted path"));
            issues.push(Issue {
                category: "Source Tree",
                summary: "Working tree has uncommitted changes".to_string(),
                fix: Some("Commit or stash them before syncing".to_string()),
            });
        }
        Err(e) => fail("working tree", &e.to_string()),
    }

    Some(root)
}

fn check_sync_state(config: &DotmergeConfig, root: &Path) {
    ui::section("Sync State");

    let marker = SyncMarker::new(root, &config.marker_file);
    match marker.load() {
        Ok(Some(revision)) => {
            let when = marker
                .last_written()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            pass("last sync", &format!("{} at {when}", revision.short()));
        }
        Ok(None) => pass("last sync", "never; the first sync treats every file as changed"),
        Err(e) => fail("last sync", &format!("{e:#}")),
    }
    ui::kv("marker", &marker.path().display().to_string());
    ui::kv("branch", &config.branch);
    ui::kv("cache", &root.join(&config.external_dir).display().to_string());
}
