//! Three-way classification of a changed file.
//!
//! Compares base (upstream at the last sync), yours (local) and theirs
//! (upstream now) and decides whether the local file can be updated
//! silently, is already up to date, or needs the operator.

use serde::Serialize;
use std::fmt;

use crate::fetch::Fetched;

/// What to do with a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Local content already matches upstream
    Skip,
    /// Local content is untouched since the last sync; safe to overwrite
    AutoUpdate,
    /// Local and upstream both changed
    Conflict,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::AutoUpdate => write!(f, "auto-update"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// A buffer is binary if it contains a NUL byte.
pub fn is_binary(content: &[u8]) -> bool {
    content.contains(&0)
}

/// Returns true if any of the buffers is binary
pub fn any_binary(buffers: &[&[u8]]) -> bool {
    buffers.iter().any(|b| is_binary(b))
}

fn is_strippable(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Trim leading and trailing whitespace from the buffer as a whole.
pub fn strip(content: &[u8]) -> &[u8] {
    let start = content
        .iter()
        .position(|b| !is_strippable(*b))
        .unwrap_or(content.len());
    let end = content
        .iter()
        .rposition(|b| !is_strippable(*b))
        .map_or(start, |idx| idx + 1);
    &content[start..end]
}

/// Classify a file from its three versions.
///
/// Text is compared with surrounding whitespace stripped, so trailing
/// newline churn does not register as a change. If any version is binary,
/// every comparison is byte-exact.
pub fn classify(base: &[u8], yours: &[u8], theirs: &[u8]) -> Classification {
    let (base, yours, theirs) = if any_binary(&[base, yours, theirs]) {
        (base, yours, theirs)
    } else {
        (strip(base), strip(yours), strip(theirs))
    };

    if yours == theirs {
        Classification::Skip
    } else if yours == base {
        Classification::AutoUpdate
    } else {
        Classification::Conflict
    }
}

/// Classify from fetch results.
///
/// Returns `None` when yours or theirs could not be read. A missing base
/// means the file is new upstream and is compared as empty.
pub fn classify_fetched(
    base: &Fetched,
    yours: &Fetched,
    theirs: &Fetched,
) -> Option<Classification> {
    let yours = yours.as_bytes()?;
    let theirs = theirs.as_bytes()?;
    let base = base.as_bytes().unwrap_or_default();
    Some(classify(base, yours, theirs))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_whole_buffer_only() {
        assert_eq!(strip(b"  a\n b \n\n"), b"a\n b");
        assert_eq!(strip(b"\x0b\x0cx\r\n"), b"x");
        assert_eq!(strip(b" \n\t"), b"");
        assert_eq!(strip(b""), b"");
    }

    #[test]
    fn binary_detection_is_nul_byte() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"caf\xc3\xa9"));
        assert!(!is_binary(b"\xff\xfe"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn classification_is_pure() {
        let (b, y, t) = (&b"a\n"[..], &b"b\n"[..], &b"c\n"[..]);
        assert_eq!(classify(b, y, t), classify(b, y, t));
        assert_eq!(classify(b, b, t), classify(b, b, t));
    }

    #[test]
    fn skip_when_yours_matches_theirs_regardless_of_base() {
        for base in [&b""[..], &b"old"[..], &b"new\n"[..]] {
            assert_eq!(classify(base, b"new\n", b"new"), Classification::Skip);
            assert_eq!(classify(base, b"  new", b"new\n\n"), Classification::Skip);
        }
    }

    #[test]
    fn auto_update_when_yours_matches_base() {
        assert_eq!(classify(b"v1\n", b"v1", b"v2\n"), Classification::AutoUpdate);
        assert_eq!(classify(b"v1", b"\nv1\n", b"v2"), Classification::AutoUpdate);
    }

    #[test]
    fn internal_whitespace_still_counts() {
        assert_eq!(classify(b"a b", b"a  b", b"a\tb"), Classification::Conflict);
    }

    #[test]
    fn binary_disables_stripping() {
        // Would be a skip under stripping; byte-exact it is a conflict
        let base = b"\0old";
        let yours = b"\0same\n";
        let theirs = b"\0same";
        assert_eq!(classify(base, yours, theirs), Classification::Conflict);

        // A NUL in base alone is enough to make the record binary
        assert_eq!(classify(b"\0", b"text\n", b"text"), Classification::Conflict);
        assert_eq!(classify(b"x", b"text\n", b"text"), Classification::Skip);
    }

    #[test]
    fn new_file_with_empty_base() {
        assert_eq!(classify(b"", b"", b"fresh"), Classification::AutoUpdate);
        assert_eq!(classify(b"", b"mine", b"fresh"), Classification::Conflict);
    }

    #[test]
    fn untouched_local_file_takes_upstream() {
        assert_eq!(
            classify(b"x\ny\n", b"x\ny\n", b"x\nz\n"),
            Classification::AutoUpdate
        );
    }

    #[test]
    fn same_line_edited_on_both_sides_conflicts() {
        assert_eq!(
            classify(b"x\ny\n", b"x\nQ\n", b"x\nz\n"),
            Classification::Conflict
        );
    }

    #[test]
    fn untouched_binary_takes_upstream() {
        let base = b"\x89PNG\0v1";
        let theirs = b"\x89PNG\0v2";
        assert_eq!(classify(base, base, theirs), Classification::AutoUpdate);
    }

    #[test]
    fn classify_fetched_exclusions() {
        fn text(s: &[u8]) -> Fetched {
            Fetched::Found(s.to_vec())
        }

        assert_eq!(
            classify_fetched(&Fetched::NotFound, &text(b""), &text(b"new")),
            Some(Classification::AutoUpdate)
        );
        assert_eq!(
            classify_fetched(&text(b"a"), &Fetched::NotFound, &text(b"b")),
            None
        );
        assert_eq!(
            classify_fetched(&text(b"a"), &text(b"a"), &Fetched::NotFound),
            None
        );
    }
}
