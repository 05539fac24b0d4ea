//! Content fetching for the three sides of a comparison.
//!
//! Content is always raw bytes. A file that could not be read is
//! [`Fetched::NotFound`], which is different from an empty file.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::backend::Backend;
use crate::types::Revision;

/// Result of reading one version of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The content was read
    Found(Vec<u8>),
    /// The file does not exist at that point (or could not be read)
    NotFound,
}

impl Fetched {
    /// Borrow the content, if present
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Found(bytes) => Some(bytes),
            Self::NotFound => None,
        }
    }

    /// Take the content, if present
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Found(bytes) => Some(bytes),
            Self::NotFound => None,
        }
    }

    /// Returns true if the content was read
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl From<Option<Vec<u8>>> for Fetched {
    fn from(value: Option<Vec<u8>>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Content of `path` as it was at `revision` in the upstream repository.
///
/// A missing revision (first run) and backend failures both yield
/// `NotFound`; the failure is logged.
pub fn fetch_at(
    backend: &dyn Backend,
    repo: &Path,
    revision: Option<&Revision>,
    path: &str,
) -> Fetched {
    let Some(revision) = revision else {
        return Fetched::NotFound;
    };
    match backend.read_file_at(repo, revision, path) {
        Ok(content) => content.into(),
        Err(e) => {
            log::warn!("Could not read {path} at {}: {e}", revision.short());
            Fetched::NotFound
        }
    }
}

/// Current content of a local file.
pub fn fetch_local(path: &Path) -> Fetched {
    match fs::read(path) {
        Ok(bytes) => Fetched::Found(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Fetched::NotFound,
        Err(e) => {
            log::warn!("Could not read {}: {e}", path.display());
            Fetched::NotFound
        }
    }
}
