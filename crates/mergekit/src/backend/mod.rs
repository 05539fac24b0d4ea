use std::path::Path;

use crate::error::Result;
use crate::types::Revision;

pub mod git;

/// Version-control operations the reconciliation engine depends on.
///
/// The engine never shells out itself; everything goes through this trait so
/// it can be driven by git in production and by an in-memory fake in tests.
pub trait Backend {
    /// Current revision of the repository at `repo`
    fn current_revision(&self, repo: &Path) -> Result<Revision>;

    /// Raw content of `path` at `revision`, or `None` if it did not exist
    fn read_file_at(&self, repo: &Path, revision: &Revision, path: &str)
    -> Result<Option<Vec<u8>>>;

    /// Every file path present at `revision`
    fn list_files_at(&self, repo: &Path, revision: &Revision) -> Result<Vec<String>>;

    /// Paths added, removed or modified between two revisions (names only)
    fn diff_paths(&self, repo: &Path, old: &Revision, new: &Revision) -> Result<Vec<String>>;

    /// Overwrite `paths` in the working tree of `repo` with their content at
    /// `reference`, in one operation
    fn checkout_paths(&self, repo: &Path, reference: &str, paths: &[&Path]) -> Result<()>;

    /// `(status, path)` pairs describing how `to` differs from `from`
    fn name_status(&self, repo: &Path, from: &str, to: &str) -> Result<Vec<(String, String)>>;
}

/// The default backend (git on PATH).
pub fn default_backend() -> Result<git::GitBackend> {
    git::GitBackend::new()
}
