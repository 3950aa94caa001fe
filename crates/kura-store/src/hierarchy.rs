//! Directory semantics over flat, path-keyed entries.
//!
//! Nothing in the table backend stores a tree. A directory's contents are
//! the entries whose canonical path starts with `dir/`, and a direct child is
//! one with exactly one more segment. The helpers here derive those answers
//! from paths alone so the SQL stays a simple range scan over the primary key.

use crate::path::SEPARATOR;

/// Half-open range `[lower, upper)` of canonical paths.
///
/// Byte-wise ordering puts every strict descendant of `p` between `p/` and
/// `p0`, because `'0'` is the byte that follows `'/'`. SQLite compares TEXT
/// with memcmp by default, so the range works directly against the primary
/// key index with no LIKE escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRange {
    pub lower: String,
    pub upper: String,
}

impl PrefixRange {
    /// Returns true if `path` lies inside the range.
    pub fn contains(&self, path: &str) -> bool {
        path >= self.lower.as_str() && path < self.upper.as_str()
    }
}

/// Range covering the strict descendants of `path`.
pub fn descendant_range(path: &str) -> PrefixRange {
    PrefixRange {
        lower: format!("{path}/"),
        upper: format!("{path}0"),
    }
}

/// Name of `path` if it is a direct child of `parent`.
///
/// `parent` of `None` is the root.
pub fn child_name<'a>(parent: Option<&str>, path: &'a str) -> Option<&'a str> {
    let rest = match parent {
        None => path,
        Some(parent) => path.strip_prefix(parent)?.strip_prefix(SEPARATOR)?,
    };
    if rest.is_empty() || rest.contains(SEPARATOR) {
        None
    } else {
        Some(rest)
    }
}

/// Proper ancestors of `path`, shortest first.
///
/// `a/b/c` yields `a` then `a/b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices(SEPARATOR).map(move |(i, _)| &path[..i])
}

/// Returns true if `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || descendant_range(ancestor).contains(path)
}
