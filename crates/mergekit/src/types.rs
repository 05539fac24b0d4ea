use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Revision
// ============================================================================

/// Opaque, immutable identifier for a point in the upstream history.
///
/// In practice this is a commit id, but nothing in this crate looks inside
/// it other than for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Create a revision from a raw token.
    ///
    /// Returns `None` for blank tokens, which callers treat as "no snapshot".
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display (first 8 characters)
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Subdir
// ============================================================================

/// Optional subdirectory of the upstream repository that holds the dotfiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subdir(Option<String>);

impl Subdir {
    /// The whole repository
    pub fn root() -> Self {
        Self(None)
    }

    /// Parse a user-supplied subdirectory.
    ///
    /// `""`, `"."` and `"/"` all mean the repository root. Surrounding
    /// slashes are dropped.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() || trimmed == "." {
            Self(None)
        } else {
            Self(Some(trimmed.to_string()))
        }
    }

    /// The prefix, if any
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Returns true if this is the repository root
    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    /// Returns true if `path` falls under this subdirectory.
    ///
    /// This is a plain string prefix test: `dots` also admits `dotsfoo/x`.
    pub fn admits(&self, path: &str) -> bool {
        match &self.0 {
            Some(prefix) => path.starts_with(prefix.as_str()),
            None => true,
        }
    }

    /// Remove the subdirectory prefix and any leading separator from `path`.
    ///
    /// Paths outside the subdirectory are returned unchanged.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        match &self.0 {
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.trim_start_matches('/'),
                None => path,
            },
            None => path,
        }
    }

    /// Git tree-ish naming this subdirectory at `revision` (e.g. `HEAD:dots`)
    pub fn treeish(&self, revision: &str) -> String {
        match &self.0 {
            Some(prefix) => format!("{revision}:{prefix}"),
            None => revision.to_string(),
        }
    }
}

impl fmt::Display for Subdir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("."))
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// Set of upstream-relative paths touched between two snapshots.
///
/// Stored sorted so that output and processing order are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    /// Build a change set, keeping only paths admitted by `subdir`.
    ///
    /// Blank lines and absolute paths are dropped.
    pub fn filtered<I, S>(paths: I, subdir: &Subdir) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths = paths
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.trim().is_empty() && !p.starts_with('/'))
            .filter(|p| subdir.admits(p))
            .collect();
        Self { paths }
    }

    /// Number of changed paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns true if `path` is part of the change set
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Iterate paths in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::filtered(iter, &Subdir::root())
    }
}

// ============================================================================
// Side
// ============================================================================

/// One of the three content versions taking part in a three-way comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Upstream content at the previous sync point
    Base,
    /// Current local content
    Yours,
    /// Upstream content at the new sync point
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Yours => write!(f, "yours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}
