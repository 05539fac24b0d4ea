//! Terminal implementations of the resolver's operator hooks.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Select};
use mergekit::{ConflictRecord, Editor, Prompter, Resolution};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::commands::report;
use crate::runner;
use crate::ui;

/// Ask a yes/no question; `assume_yes` answers without prompting.
pub fn confirm(prompt: &str, default: bool, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        log::debug!("stdin is not a terminal, answering '{prompt}' with {default}");
        return Ok(default);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("Failed to read confirmation")
}

fn label(choice: Resolution) -> String {
    match choice {
        Resolution::TakeTheirs => "[t] Take theirs (overwrite with upstream)".to_string(),
        Resolution::KeepYours => "[k] Keep yours (leave the local file)".to_string(),
        Resolution::Merge => "[m] Merge (three-way, editor on overlap)".to_string(),
    }
}

/// Presents each conflict with its diffs and asks for a resolution.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    shown: Option<PathBuf>,
}

impl TerminalPrompter {
    fn present(&mut self, record: &ConflictRecord) {
        if self.shown.as_deref() == Some(record.local.as_path()) {
            return;
        }
        self.shown = Some(record.local.clone());

        ui::banner(&format!("CONFLICT: {}", record.local.display()));
        if record.new_upstream {
            ui::dim("New upstream file; there is no common base version.");
        }
        if record.binary {
            report::print_binary_notice();
        } else {
            report::print_delta("YOUR CHANGES (local vs base)", &record.base, &record.yours);
            report::print_delta("THEIR CHANGES (upstream vs base)", &record.base, &record.theirs);
        }
        println!();
    }
}

impl Prompter for TerminalPrompter {
    fn choose(
        &mut self,
        record: &ConflictRecord,
        allowed: &[Resolution],
    ) -> mergekit::Result<Resolution> {
        self.present(record);

        let items: Vec<String> = allowed.iter().copied().map(label).collect();
        let index = Select::new()
            .with_prompt("Select action")
            .items(&items)
            .default(0)
            .interact()
            .map_err(|e| mergekit::Error::Prompt(e.to_string()))?;

        allowed
            .get(index)
            .copied()
            .ok_or_else(|| mergekit::Error::Prompt(format!("invalid selection {index}")))
    }

    fn notice(&mut self, message: &str) {
        ui::warn(message);
    }
}

/// Opens files in the configured editor.
#[derive(Debug, Clone)]
pub struct EditorLauncher {
    command: String,
}

impl EditorLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Editor for EditorLauncher {
    fn open(&mut self, path: &Path) -> mergekit::Result<()> {
        let (program, args) = runner::split_command(&self.command)
            .ok_or_else(|| mergekit::Error::ToolNotFound("editor".to_string()))?;

        ui::warn(&format!(
            "Conflict markers added. Opening {program} on {}...",
            path.display()
        ));
        let status = Command::new(program)
            .args(&args)
            .arg(path)
            .status()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => mergekit::Error::ToolNotFound(program.to_string()),
                _ => mergekit::Error::Io(e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(mergekit::Error::Command {
                command: format!("{} {}", self.command, path.display()),
                stderr: format!("editor exited with {status}"),
            })
        }
    }
}
