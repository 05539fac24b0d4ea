//! # mergekit
//!
//! Upstream change detection and three-way reconciliation for chezmoi
//! source trees.
//!
//! A dotfiles repository maintained elsewhere (the upstream) is tracked by
//! revision. On each sync the files it changed are mapped onto the local
//! chezmoi source tree, whose file names carry attribute prefixes such as
//! `private_` and `dot_`, and every file is sorted into one of three
//! buckets:
//!
//! - **skip**: the local file already matches upstream
//! - **auto-update**: the local file was not edited since the last sync,
//!   so upstream can be taken as is
//! - **conflict**: both sides changed; the operator decides
//!
//! ## Pipeline
//!
//! 1. [`differ::changed_paths`] lists upstream paths touched between two
//!    revisions (or every path on the first run).
//! 2. [`plan::analyze`] maps each path with [`mapper`], reads the base,
//!    yours and theirs versions with [`fetch`] and classifies them with
//!    [`classify`].
//! 3. [`plan::apply_auto_updates`] checks out every auto-update in a single
//!    operation.
//! 4. [`resolver::Resolver`] walks the conflicts one by one, asking a
//!    [`resolver::Prompter`] for take theirs, keep yours or merge.
//! 5. [`report::summarize`] describes what the comparison branch changes.
//!
//! ## Example
//!
//! ```no_run
//! use mergekit::{SyncContext, Subdir, Revision, backend::{Backend, git::GitBackend}};
//!
//! let git = GitBackend::new()?;
//! let cache = std::path::Path::new("/home/me/src/.external_sources/dotfiles");
//! let new = git.current_revision(cache)?;
//! let ctx = SyncContext {
//!     work_tree: "/home/me/src".into(),
//!     cache_repo: cache.to_path_buf(),
//!     compare_ref: "compare-external".to_string(),
//!     subdir: Subdir::parse("home"),
//!     old: Revision::new("3f2a9c1"),
//!     new,
//!     excluded_dirs: vec![".external_sources".to_string()],
//! };
//!
//! let changes = mergekit::differ::changed_paths(
//!     &git, &ctx.cache_repo, ctx.old.as_ref(), Some(&ctx.new), &ctx.subdir,
//! )?;
//! let plan = mergekit::plan::analyze(&ctx, &git, &changes);
//! println!("{} conflict(s)", plan.conflicts.len());
//! # Ok::<(), mergekit::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod backend;
pub mod classify;
pub mod differ;
pub mod error;
pub mod fetch;
pub mod mapper;
pub mod merge;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod types;

pub use classify::{Classification, classify};
pub use error::{Error, Result};
pub use fetch::Fetched;
pub use mapper::LocalMatch;
pub use merge::{BuiltinMerger, GitMergeFile, MergeOutcome, TextMerger};
pub use plan::{ConflictRecord, MergePlan, SyncContext};
pub use report::Summary;
pub use resolver::{Editor, Prompter, Resolution, ResolveOutcome, ResolveRun, Resolver};
pub use types::{ChangeSet, Revision, Side, Subdir};
