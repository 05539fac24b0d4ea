//! Line-based three-way merge of a local file with its upstream change.
//!
//! Two implementations are provided: [`GitMergeFile`] runs
//! `git merge-file` on scratch copies of base and incoming, and
//! [`BuiltinMerger`] merges in-process with `diffy`. Both edit the local
//! file in place and label conflict regions `current`, `base` and
//! `incoming`.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Marker label for the local side
pub const LABEL_CURRENT: &str = "current";
/// Marker label for the common ancestor
pub const LABEL_BASE: &str = "base";
/// Marker label for the upstream side
pub const LABEL_INCOMING: &str = "incoming";

/// Result of a merge that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Both sides merged without overlap; the file holds the result
    Clean,
    /// Overlapping edits; the file now contains conflict markers
    Marked,
}

/// Something that can three-way merge upstream changes into a local file.
pub trait TextMerger {
    /// Merge `theirs` (relative to `base`) into the file at `current`.
    ///
    /// On success the file has been rewritten. An error means the merge
    /// could not be attempted and the file is unchanged.
    fn merge_in_place(&self, current: &Path, base: &[u8], theirs: &[u8]) -> Result<MergeOutcome>;
}

// ============================================================================
// git merge-file
// ============================================================================

/// Merge using `git merge-file`.
#[derive(Debug, Clone)]
pub struct GitMergeFile {
    program: String,
    /// Where base and incoming are staged for the tool
    scratch_dir: PathBuf,
}

impl Default for GitMergeFile {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl GitMergeFile {
    fn scratch(&self, prefix: &str, content: &[u8]) -> Result<NamedTempFile> {
        let stage = || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new()
                .prefix(prefix)
                .tempfile_in(&self.scratch_dir)?;
            file.write_all(content)?;
            file.flush()?;
            Ok(file)
        };
        stage().map_err(|e| {
            Error::MergeTool(format!(
                "could not stage merge input in {}: {e}",
                self.scratch_dir.display()
            ))
        })
    }
}

impl TextMerger for GitMergeFile {
    fn merge_in_place(&self, current: &Path, base: &[u8], theirs: &[u8]) -> Result<MergeOutcome> {
        // Both scratch files are removed when they go out of scope
        let base_file = self.scratch("dotmerge-base-", base)?;
        let theirs_file = self.scratch("dotmerge-incoming-", theirs)?;

        log::debug!("Running {} merge-file on {}", self.program, current.display());
        let output = Command::new(&self.program)
            .arg("merge-file")
            .args(["-L", LABEL_CURRENT, "-L", LABEL_BASE, "-L", LABEL_INCOMING])
            .arg(current)
            .arg(base_file.path())
            .arg(theirs_file.path())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::MergeTool(format!("could not run {}: {e}", self.program)))?;

        // Exit code is the number of conflicts (capped at 127); errors are negative
        match output.status.code() {
            Some(0) => Ok(MergeOutcome::Clean),
            Some(1..=127) => Ok(MergeOutcome::Marked),
            Some(code) => Err(Error::MergeTool(format!(
                "{} merge-file exited with {code}: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            None => Err(Error::MergeTool(format!(
                "{} merge-file was terminated by a signal",
                self.program
            ))),
        }
    }
}

// ============================================================================
// In-process merge
// ============================================================================

/// Merge in-process with `diffy`; needs no external tools.
///
/// Only UTF-8 text can be merged this way.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMerger;

fn as_text<'a>(content: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(content)
        .map_err(|_| Error::MergeTool(format!("{what} is not valid UTF-8")))
}

/// Rename diffy's conflict markers to the labels used everywhere else.
fn relabel(merged: &str) -> String {
    merged
        .split_inclusive('\n')
        .map(|line| {
            let body = line.trim_end_matches(['\n', '\r']);
            let ending = &line[body.len()..];
            let renamed = match body {
                "<<<<<<< ours" => format!("<<<<<<< {LABEL_CURRENT}"),
                "||||||| original" => format!("||||||| {LABEL_BASE}"),
                ">>>>>>> theirs" => format!(">>>>>>> {LABEL_INCOMING}"),
                _ => return line.to_string(),
            };
            renamed + ending
        })
        .collect()
}

impl TextMerger for BuiltinMerger {
    fn merge_in_place(&self, current: &Path, base: &[u8], theirs: &[u8]) -> Result<MergeOutcome> {
        let yours = fs::read(current)?;
        let yours = as_text(&yours, "local file")?;
        let base = as_text(base, "base version")?;
        let theirs = as_text(theirs, "incoming version")?;

        let (merged, outcome) = match diffy::merge(base, yours, theirs) {
            Ok(clean) => (clean, MergeOutcome::Clean),
            Err(marked) => (relabel(&marked), MergeOutcome::Marked),
        };
        fs::write(current, merged)?;
        Ok(outcome)
    }
}

/// Returns true if `content` still contains an unresolved conflict region.
pub fn has_markers(content: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content);
    let mut open = false;
    for line in text.lines() {
        if line.starts_with("<<<<<<< ") {
            open = true;
        } else if open && line.starts_with(">>>>>>> ") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::git::GitBackend;
    use tempfile::TempDir;

    fn local(dir: &TempDir, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("dot_gitconfig");
        fs::write(&path, content).unwrap();
        path
    }

    // ── builtin ──────────────────────────────────────────────────────

    #[test]
    fn builtin_overlapping_edit_is_marked() {
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"x\nQ\n");

        let outcome = BuiltinMerger.merge_in_place(&path, b"x\ny\n", b"x\nz\n").unwrap();
        assert_eq!(outcome, MergeOutcome::Marked);

        let merged = fs::read_to_string(&path).unwrap();
        assert!(merged.contains("<<<<<<< current\n"));
        assert!(merged.contains(">>>>>>> incoming\n"));
        assert!(merged.contains("Q\n"));
        assert!(merged.contains("z\n"));
        assert!(!merged.contains("<<<<<<< ours"));
        assert!(has_markers(merged.as_bytes()));
    }

    #[test]
    fn builtin_separate_edits_merge_cleanly() {
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"A\nb\nc\nd\ne\n");

        let outcome = BuiltinMerger
            .merge_in_place(&path, b"a\nb\nc\nd\ne\n", b"a\nb\nc\nd\nE\n")
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Clean);
        assert_eq!(fs::read_to_string(&path).unwrap(), "A\nb\nc\nd\nE\n");
    }

    #[test]
    fn builtin_rejects_non_utf8_and_leaves_file_alone() {
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"x\n");

        let err = BuiltinMerger
            .merge_in_place(&path, b"x\n", b"\xff\xfe\n")
            .unwrap_err();
        assert!(matches!(err, Error::MergeTool(_)));
        assert_eq!(fs::read(&path).unwrap(), b"x\n");
    }

    #[test]
    fn relabel_only_touches_marker_lines() {
        let input = "<<<<<<< ours\nmine\n||||||| original\nold\n=======\nnew\n>>>>>>> theirs\nours\n";
        assert_eq!(
            relabel(input),
            "<<<<<<< current\nmine\n||||||| base\nold\n=======\nnew\n>>>>>>> incoming\nours\n"
        );
    }

    #[test]
    fn marker_detection() {
        assert!(!has_markers(b"plain\n"));
        assert!(!has_markers(b"<<<<<<< current\nunterminated\n"));
        assert!(has_markers(b"<<<<<<< current\na\n=======\nb\n>>>>>>> incoming\n"));
    }

    // ── git merge-file ───────────────────────────────────────────────

    #[test]
    fn git_merge_file_marks_conflicts() {
        if !GitBackend::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"x\nQ\n");

        let outcome = GitMergeFile::default()
            .merge_in_place(&path, b"x\ny\n", b"x\nz\n")
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Marked);

        let merged = fs::read_to_string(&path).unwrap();
        assert!(merged.contains("<<<<<<< current"));
        assert!(merged.contains(">>>>>>> incoming"));
    }

    #[test]
    fn git_merge_file_clean() {
        if !GitBackend::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"A\nb\nc\nd\ne\n");

        let outcome = GitMergeFile::default()
            .merge_in_place(&path, b"a\nb\nc\nd\ne\n", b"a\nb\nc\nd\nE\n")
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Clean);
        assert_eq!(fs::read_to_string(&path).unwrap(), "A\nb\nc\nd\nE\n");
    }

    #[test]
    fn missing_merge_program_is_a_merge_tool_error() {
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"x\n");
        let merger = GitMergeFile {
            program: "dotmerge-no-such-program".to_string(),
            ..GitMergeFile::default()
        };

        let err = merger.merge_in_place(&path, b"x\n", b"y\n").unwrap_err();
        assert!(matches!(err, Error::MergeTool(_)));
        assert_eq!(fs::read(&path).unwrap(), b"x\n");
    }

    #[test]
    fn unusable_scratch_dir_is_a_merge_tool_error() {
        let tmp = TempDir::new().unwrap();
        let path = local(&tmp, b"x\n");
        let merger = GitMergeFile {
            scratch_dir: tmp.path().join("missing"),
            ..GitMergeFile::default()
        };

        let err = merger.merge_in_place(&path, b"x\n", b"y\n").unwrap_err();
        assert!(matches!(err, Error::MergeTool(ref reason) if reason.contains("stage")));
        assert_eq!(fs::read(&path).unwrap(), b"x\n");
    }
}
