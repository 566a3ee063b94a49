//! Object key derivation
//!
//! Object keys are the prefix-joined, slash-normalized relative path of a
//! local file under its source root. [`relative_key`] joins path components
//! with `/` whatever the host separator is, so `/` is the only separator
//! [`object_key`] splits on. A `\` is an ordinary character in a Unix file
//! name and stays part of its segment.

use std::path::{Component, Path};

use super::errors::DomainError;

/// Splits `raw` on `/` and applies `.`/`..` cleaning onto `out`.
fn push_segments<'a>(out: &mut Vec<&'a str>, raw: &'a str) {
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
}

/// Builds the object key for `relative_path` under `prefix`.
///
/// The prefix segment is omitted entirely when `prefix` is empty.
///
/// ```
/// use vaultsync_core::domain::object_key;
///
/// assert_eq!(object_key("", "a/b.txt"), "a/b.txt");
/// assert_eq!(object_key("backups", "a/b.txt"), "backups/a/b.txt");
/// ```
pub fn object_key(prefix: &str, relative_path: &str) -> String {
    let mut segments = Vec::new();
    push_segments(&mut segments, prefix);

    // Cleaned separately so `..` in the path can never climb into the prefix.
    let mut path_segments = Vec::new();
    push_segments(&mut path_segments, relative_path);

    segments.extend(path_segments);
    segments.join("/")
}

/// Prefix used when listing remote objects for `prefix`.
///
/// A non-empty prefix gets a trailing slash so that a listing for
/// `backups` never returns objects stored under `backups2/`.
pub fn listing_prefix(prefix: &str) -> String {
    let normalized = object_key(prefix, "");
    if normalized.is_empty() {
        normalized
    } else {
        format!("{normalized}/")
    }
}

/// Relative path of `file` below `root`, joined with `/`.
///
/// # Errors
///
/// Returns [`DomainError::InvalidPath`] when `file` is not below `root` or a
/// component is not valid UTF-8.
pub fn relative_key(root: &Path, file: &Path) -> Result<String, DomainError> {
    let relative = file.strip_prefix(root).map_err(|_| {
        DomainError::InvalidPath(format!(
            "{} is not below {}",
            file.display(),
            root.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    DomainError::InvalidPath(format!("non UTF-8 path: {}", file.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(DomainError::InvalidPath(format!(
                    "unexpected component in {}",
                    relative.display()
                )))
            }
        }
    }

    Ok(parts.join("/"))
}
