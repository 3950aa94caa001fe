//! Canonical path handling.
//!
//! Every backend keys entries by canonical path: no leading or trailing
//! separator, no empty or `.` segments, case preserved. The root is virtual
//! and has no canonical form of its own.

use crate::error::{StorageError, StorageResult};

/// Path separator.
pub const SEPARATOR: char = '/';

/// Normalize a path to its canonical form.
///
/// Fails with `InvalidPath` if the path contains a `..` segment or a NUL
/// byte, or if nothing is left after stripping separators.
pub fn normalize(path: &str) -> StorageResult<String> {
    normalize_parent(path)?.ok_or_else(|| StorageError::invalid_path(format!("{path:?} is empty")))
}

/// Normalize a path that may name the root.
///
/// Returns `None` for the root (`""`, `"/"`, `"./"` and the like).
pub fn normalize_parent(path: &str) -> StorageResult<Option<String>> {
    if path.contains('\0') {
        return Err(StorageError::invalid_path(format!(
            "{path:?} contains a NUL byte"
        )));
    }

    let mut canonical = String::with_capacity(path.len());
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::invalid_path(format!(
                    "{path:?} contains a parent segment"
                )));
            }
            s => {
                if !canonical.is_empty() {
                    canonical.push(SEPARATOR);
                }
                canonical.push_str(s);
            }
        }
    }

    if canonical.is_empty() {
        Ok(None)
    } else {
        Ok(Some(canonical))
    }
}

/// Join a base URL and a canonical path.
///
/// Trailing separators on `base` are dropped so the result has exactly one
/// separator between the two. No escaping is applied.
pub fn join_url(base: &str, canonical: &str) -> String {
    format!("{}{}{}", base.trim_end_matches(SEPARATOR), SEPARATOR, canonical)
}
