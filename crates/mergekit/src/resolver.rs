//! Interactive conflict resolution.
//!
//! Each conflict is presented to the operator, who picks one of
//! [`Resolution`]. Prompting and editing are abstracted behind
//! [`Prompter`] and [`Editor`] so the state machine runs the same in a
//! terminal and in tests.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::merge::{MergeOutcome, TextMerger};
use crate::plan::{ConflictRecord, SyncContext};

/// What the operator wants done with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Overwrite the local file with upstream
    TakeTheirs,
    /// Leave the local file alone
    KeepYours,
    /// Three-way merge, falling back to the editor on overlap
    Merge,
}

impl Resolution {
    /// Every choice, in prompt order
    pub const ALL: [Resolution; 3] = [Self::TakeTheirs, Self::KeepYours, Self::Merge];

    /// Choices when merging is not possible
    pub const NO_MERGE: [Resolution; 2] = [Self::TakeTheirs, Self::KeepYours];

    /// Single-key shortcut
    pub fn key(self) -> char {
        match self {
            Self::TakeTheirs => 't',
            Self::KeepYours => 'k',
            Self::Merge => 'm',
        }
    }

    /// Parse a shortcut or full word
    pub fn from_key(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "t" | "take" | "theirs" => Some(Self::TakeTheirs),
            "k" | "keep" | "yours" => Some(Self::KeepYours),
            "m" | "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeTheirs => write!(f, "take theirs"),
            Self::KeepYours => write!(f, "keep yours"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Final state of one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ResolveOutcome {
    KeptYours,
    TookTheirs,
    /// Merged without overlap
    Clean,
    /// Merged with markers and handed to the editor
    Marked,
    /// The chosen action could not be carried out
    Failed(String),
}

impl ResolveOutcome {
    /// Returns true if the local file was modified
    pub fn changed_file(&self) -> bool {
        matches!(self, Self::TookTheirs | Self::Clean | Self::Marked)
    }
}

/// A conflict together with how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub upstream: String,
    pub local: PathBuf,
    #[serde(flatten)]
    pub outcome: ResolveOutcome,
}

/// What a batch of conflicts came to.
///
/// Conflicts handled before an abort may already have rewritten files, so
/// their outcomes are kept alongside the error that stopped the run.
#[derive(Debug, Default)]
pub struct ResolveRun {
    /// Outcomes in conflict order, up to where the run stopped
    pub resolved: Vec<Resolved>,
    /// Prompt failure that ended the run early
    pub aborted: Option<Error>,
}

impl ResolveRun {
    /// Returns true if every conflict of a batch of `total` got an outcome
    pub fn finished(&self, total: usize) -> bool {
        self.aborted.is_none() && self.resolved.len() == total
    }
}

/// Asks the operator what to do.
pub trait Prompter {
    /// Pick one of `allowed` for `record`.
    ///
    /// An error means no more input can be collected and stops the run.
    fn choose(&mut self, record: &ConflictRecord, allowed: &[Resolution]) -> Result<Resolution>;

    /// Tell the operator something about the record in progress
    fn notice(&mut self, message: &str);
}

/// Opens a file for manual editing and blocks until the editor exits.
pub trait Editor {
    fn open(&mut self, path: &Path) -> Result<()>;
}

/// Drives conflicts through the operator's choices.
pub struct Resolver<'a> {
    backend: &'a dyn Backend,
    merger: &'a dyn TextMerger,
    ctx: &'a SyncContext,
}

impl<'a> Resolver<'a> {
    pub fn new(backend: &'a dyn Backend, merger: &'a dyn TextMerger, ctx: &'a SyncContext) -> Self {
        Self {
            backend,
            merger,
            ctx,
        }
    }

    /// Resolve one conflict.
    ///
    /// Only prompt failures are returned as errors; anything else that goes
    /// wrong ends up in [`ResolveOutcome::Failed`].
    pub fn resolve(
        &self,
        record: &ConflictRecord,
        prompter: &mut dyn Prompter,
        editor: &mut dyn Editor,
    ) -> Result<ResolveOutcome> {
        let mut allowed: &[Resolution] = &Resolution::ALL;

        loop {
            let choice = prompter.choose(record, allowed)?;
            if !allowed.contains(&choice) {
                prompter.notice(&format!("'{choice}' is not available here"));
                continue;
            }
            log::debug!("{}: {choice}", record.local.display());

            match choice {
                Resolution::KeepYours => return Ok(ResolveOutcome::KeptYours),
                Resolution::TakeTheirs => return Ok(self.take_theirs(record)),
                Resolution::Merge if record.binary => {
                    prompter.notice("Cannot merge a binary file. Take theirs or keep yours.");
                    allowed = &Resolution::NO_MERGE;
                }
                Resolution::Merge => match self.merge(record, editor) {
                    Ok(outcome) => return Ok(outcome),
                    Err(Error::MergeTool(reason)) => {
                        log::warn!("Merge failed for {}: {reason}", record.local.display());
                        prompter.notice(&format!("Merge failed ({reason}). Take theirs or keep yours."));
                        allowed = &Resolution::NO_MERGE;
                    }
                    Err(e) => return Ok(ResolveOutcome::Failed(e.to_string())),
                },
            }
        }
    }

    /// Resolve every conflict in order.
    ///
    /// Stops at the first prompt failure, keeping the outcomes gathered so
    /// far; all other failures are recorded per file and processing
    /// continues.
    pub fn resolve_all(
        &self,
        conflicts: &[ConflictRecord],
        prompter: &mut dyn Prompter,
        editor: &mut dyn Editor,
    ) -> ResolveRun {
        let mut run = ResolveRun {
            resolved: Vec::with_capacity(conflicts.len()),
            aborted: None,
        };
        for record in conflicts {
            let outcome = match self.resolve(record, prompter, editor) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("Stopped at {}: {e}", record.local.display());
                    run.aborted = Some(e);
                    break;
                }
            };
            if let ResolveOutcome::Failed(reason) = &outcome {
                log::warn!("Could not resolve {}: {reason}", record.local.display());
            }
            run.resolved.push(Resolved {
                upstream: record.upstream.clone(),
                local: record.local.clone(),
                outcome,
            });
        }
        run
    }

    fn take_theirs(&self, record: &ConflictRecord) -> ResolveOutcome {
        match self.backend.checkout_paths(
            &self.ctx.work_tree,
            &self.ctx.compare_ref,
            &[record.local.as_path()],
        ) {
            Ok(()) => ResolveOutcome::TookTheirs,
            Err(e) => ResolveOutcome::Failed(e.to_string()),
        }
    }

    fn merge(&self, record: &ConflictRecord, editor: &mut dyn Editor) -> Result<ResolveOutcome> {
        let path = self.ctx.work_tree.join(&record.local);
        match self.merger.merge_in_place(&path, &record.base, &record.theirs)? {
            MergeOutcome::Clean => Ok(ResolveOutcome::Clean),
            MergeOutcome::Marked => {
                if let Err(e) = editor.open(&path) {
                    log::warn!("Editor failed on {}: {e}", path.display());
                }
                Ok(ResolveOutcome::Marked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::merge::BuiltinMerger;
    use crate::types::{Revision, Subdir};
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    // ── fixtures ─────────────────────────────────────────────────────

    struct Scripted {
        answers: VecDeque<Resolution>,
        offered: Vec<Vec<Resolution>>,
        notices: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[Resolution]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                offered: Vec::new(),
                notices: Vec::new(),
            }
        }
    }

    impl Prompter for Scripted {
        fn choose(&mut self, _record: &ConflictRecord, allowed: &[Resolution]) -> Result<Resolution> {
            self.offered.push(allowed.to_vec());
            self.answers
                .pop_front()
                .ok_or_else(|| Error::Prompt("input closed".to_string()))
        }

        fn notice(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingEditor {
        opened: Vec<PathBuf>,
    }

    impl Editor for RecordingEditor {
        fn open(&mut self, path: &Path) -> Result<()> {
            self.opened.push(path.to_path_buf());
            Ok(())
        }
    }

    struct BrokenMerger;

    impl TextMerger for BrokenMerger {
        fn merge_in_place(&self, _: &Path, _: &[u8], _: &[u8]) -> Result<MergeOutcome> {
            Err(Error::MergeTool("killed by signal".to_string()))
        }
    }

    fn context(tmp: &TempDir) -> SyncContext {
        SyncContext {
            work_tree: tmp.path().to_path_buf(),
            cache_repo: tmp.path().join(".external_sources/dots"),
            compare_ref: "compare-external".to_string(),
            subdir: Subdir::root(),
            old: Revision::new("r1"),
            new: Revision::new("r2").unwrap(),
            excluded_dirs: Vec::new(),
        }
    }

    fn record(tmp: &TempDir, local: &str, base: &[u8], yours: &[u8], theirs: &[u8]) -> ConflictRecord {
        fs::write(tmp.path().join(local), yours).unwrap();
        ConflictRecord {
            upstream: local.replace("dot_", "."),
            local: PathBuf::from(local),
            base: base.to_vec(),
            yours: yours.to_vec(),
            theirs: theirs.to_vec(),
            binary: crate::classify::any_binary(&[base, yours, theirs]),
            new_upstream: false,
        }
    }

    fn backend() -> FakeBackend {
        FakeBackend::default().reference(
            "compare-external",
            &[("dot_gitconfig", b"x\nz\n"), ("dot_logo", b"\0new")],
        )
    }

    fn read(tmp: &TempDir, rel: &str) -> Vec<u8> {
        fs::read(tmp.path().join(rel)).unwrap()
    }

    // ── single choices ───────────────────────────────────────────────

    #[test]
    fn keep_yours_leaves_file_alone() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n");
        let mut prompter = Scripted::new(&[Resolution::KeepYours]);

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut RecordingEditor::default())
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::KeptYours);
        assert!(!outcome.changed_file());
        assert_eq!(read(&tmp, "dot_gitconfig"), b"x\nQ\n");
        assert!(backend.checkouts.borrow().is_empty());
    }

    #[test]
    fn take_theirs_checks_out_upstream() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n");
        let mut prompter = Scripted::new(&[Resolution::TakeTheirs]);

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut RecordingEditor::default())
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::TookTheirs);
        assert_eq!(read(&tmp, "dot_gitconfig"), b"x\nz\n");
    }

    #[test]
    fn take_theirs_failure_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let mut backend = backend();
        backend.fail_checkout = true;
        let rec = record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n");
        let mut prompter = Scripted::new(&[Resolution::TakeTheirs]);

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut RecordingEditor::default())
            .unwrap();

        assert!(matches!(outcome, ResolveOutcome::Failed(ref reason) if reason.contains("checkout refused")));
        assert_eq!(read(&tmp, "dot_gitconfig"), b"x\nQ\n");
    }

    #[test]
    fn overlapping_merge_opens_editor() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n");
        let mut prompter = Scripted::new(&[Resolution::Merge]);
        let mut editor = RecordingEditor::default();

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut editor)
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::Marked);
        assert_eq!(editor.opened, vec![tmp.path().join("dot_gitconfig")]);
        let merged = String::from_utf8(read(&tmp, "dot_gitconfig")).unwrap();
        assert!(merged.contains("<<<<<<< current"));
    }

    #[test]
    fn clean_merge_skips_editor() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(
            &tmp,
            "dot_gitconfig",
            b"a\nb\nc\nd\ne\n",
            b"A\nb\nc\nd\ne\n",
            b"a\nb\nc\nd\nE\n",
        );
        let mut prompter = Scripted::new(&[Resolution::Merge]);
        let mut editor = RecordingEditor::default();

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut editor)
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::Clean);
        assert!(editor.opened.is_empty());
        assert_eq!(read(&tmp, "dot_gitconfig"), b"A\nb\nc\nd\nE\n");
    }

    // ── fallbacks ────────────────────────────────────────────────────

    #[test]
    fn binary_merge_is_rejected_and_reprompted() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(&tmp, "dot_logo", b"\0old", b"\0mine", b"\0new");
        let mut prompter = Scripted::new(&[Resolution::Merge, Resolution::TakeTheirs]);

        let outcome = Resolver::new(&backend, &BuiltinMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut RecordingEditor::default())
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::TookTheirs);
        assert_eq!(prompter.notices.len(), 1);
        assert_eq!(prompter.offered[1], Resolution::NO_MERGE.to_vec());
        assert_eq!(read(&tmp, "dot_logo"), b"\0new");
    }

    #[test]
    fn merge_tool_failure_restricts_choices() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let rec = record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n");
        let mut prompter =
            Scripted::new(&[Resolution::Merge, Resolution::Merge, Resolution::KeepYours]);

        let outcome = Resolver::new(&backend, &BrokenMerger, &ctx)
            .resolve(&rec, &mut prompter, &mut RecordingEditor::default())
            .unwrap();

        assert_eq!(outcome, ResolveOutcome::KeptYours);
        assert_eq!(prompter.offered[0], Resolution::ALL.to_vec());
        assert_eq!(prompter.offered[1], Resolution::NO_MERGE.to_vec());
        // The second merge request was refused without running the tool
        assert_eq!(prompter.notices.len(), 2);
        assert_eq!(read(&tmp, "dot_gitconfig"), b"x\nQ\n");
    }

    // ── batches ──────────────────────────────────────────────────────

    #[test]
    fn resolve_all_is_sequential_and_isolated() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let mut backend = backend();
        backend.fail_checkout = true;
        let conflicts = vec![
            record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n"),
            record(&tmp, "dot_logo", b"\0old", b"\0mine", b"\0new"),
        ];
        let mut prompter = Scripted::new(&[Resolution::TakeTheirs, Resolution::KeepYours]);

        let run = Resolver::new(&backend, &BuiltinMerger, &ctx).resolve_all(
            &conflicts,
            &mut prompter,
            &mut RecordingEditor::default(),
        );

        assert!(run.finished(conflicts.len()));
        let resolved = run.resolved;
        assert_eq!(resolved.len(), 2);
        assert!(matches!(resolved[0].outcome, ResolveOutcome::Failed(_)));
        assert_eq!(resolved[1].outcome, ResolveOutcome::KeptYours);
        assert_eq!(resolved[1].local, PathBuf::from("dot_logo"));
    }

    #[test]
    fn resolve_all_stops_when_input_closes() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let backend = backend();
        let conflicts = vec![
            record(&tmp, "dot_gitconfig", b"x\ny\n", b"x\nQ\n", b"x\nz\n"),
            record(&tmp, "dot_logo", b"\0old", b"\0mine", b"\0new"),
        ];
        let mut prompter = Scripted::new(&[Resolution::TakeTheirs]);

        let run = Resolver::new(&backend, &BuiltinMerger, &ctx).resolve_all(
            &conflicts,
            &mut prompter,
            &mut RecordingEditor::default(),
        );

        assert!(run.aborted.as_ref().is_some_and(Error::is_fatal));
        assert!(!run.finished(conflicts.len()));
        // The first file was already rewritten and its outcome survives
        assert_eq!(
            run.resolved,
            vec![Resolved {
                upstream: ".gitconfig".to_string(),
                local: PathBuf::from("dot_gitconfig"),
                outcome: ResolveOutcome::TookTheirs,
            }]
        );
        assert_eq!(read(&tmp, "dot_gitconfig"), b"x\nz\n");
        assert_eq!(read(&tmp, "dot_logo"), b"\0mine");
    }

    #[test]
    fn resolution_keys() {
        assert_eq!(Resolution::from_key(" T "), Some(Resolution::TakeTheirs));
        assert_eq!(Resolution::from_key("keep"), Some(Resolution::KeepYours));
        assert_eq!(Resolution::from_key("m"), Some(Resolution::Merge));
        assert_eq!(Resolution::from_key("x"), None);
        for choice in Resolution::ALL {
            assert_eq!(Resolution::from_key(&choice.key().to_string()), Some(choice));
        }
    }
}
