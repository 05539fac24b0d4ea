use std::path::PathBuf;
use thiserror::Error;

use crate::types::Side;

/// Errors that can occur while detecting and reconciling upstream changes.
///
/// Fatal errors stop a run before the working tree is touched; everything
/// else is isolated to the single record it concerns.
#[derive(Debug, Error)]
pub enum Error {
    /// No upstream revision is available to compare against
    #[error("no upstream snapshot available (missing revision token)")]
    NoSnapshot,

    /// One of the three content versions could not be read
    #[error("{side} content unavailable for {path}")]
    FetchUnavailable {
        /// Upstream-relative path of the record
        path: String,
        /// Which of the three versions failed to resolve
        side: Side,
    },

    /// No local counterpart exists for an upstream path
    #[error("no local file matches upstream path: {0}")]
    UnresolvedLocalPath(String),

    /// The three-way text merge could not be run at all
    #[error("merge tool failed: {0}")]
    MergeTool(String),

    /// An external command exited unsuccessfully
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The command line that was run
        command: String,
        /// Trimmed standard error output
        stderr: String,
    },

    /// An external program could not be found on PATH
    #[error("{0} not found on PATH")]
    ToolNotFound(String),

    /// Operator input could not be collected
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// A path is not inside the expected root
    #[error("path is outside the working tree: {0}")]
    OutsideWorkTree(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error must abort the whole reconciliation
    /// instead of being recorded against a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NoSnapshot | Error::Prompt(_))
    }

    /// Returns true if the error only excludes one record from processing
    pub fn is_exclusion(&self) -> bool {
        matches!(
            self,
            Error::FetchUnavailable { .. } | Error::UnresolvedLocalPath(_)
        )
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
