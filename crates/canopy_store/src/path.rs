//! Helpers for absolute, `/`-separated content paths.
//!
//! Paths are plain strings. The root is `/`; every other path starts with `/`
//! and has no trailing slash. Ancestry is decided segment-wise, so `/a/b` is
//! not an ancestor of `/a/bc`.

use crate::error::{StoreError, StoreResult};

/// The root path.
pub const ROOT: &str = "/";

/// Checks that `path` is an absolute, well-formed content path.
pub fn validate(path: &str) -> StoreResult<()> {
    if !path.starts_with('/') {
        return Err(StoreError::invalid_path(path, "not absolute"));
    }
    if path != ROOT && path.ends_with('/') {
        return Err(StoreError::invalid_path(path, "trailing slash"));
    }
    if path.len() > 1 && path[1..].split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(StoreError::invalid_path(path, "empty or relative segment"));
    }
    Ok(())
}

/// Returns true if `path` is `parent` itself or lies below it.
pub fn is_same_or_descendant(parent: &str, path: &str) -> bool {
    if parent == ROOT {
        return path.starts_with('/');
    }
    path == parent
        || (path.starts_with(parent) && path.as_bytes().get(parent.len()) == Some(&b'/'))
}

/// Returns true if `path` lies strictly below `parent`.
pub fn is_descendant(parent: &str, path: &str) -> bool {
    parent != path && is_same_or_descendant(parent, path)
}

/// Returns the parent path, or `None` for the root or a relative path.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT || !path.starts_with('/') {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of the path (empty for the root).
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Iterates over the segments of an absolute path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Joins a base directory and an absolute path, e.g. `/tmp` + `/a/b` = `/tmp/a/b`.
pub fn append_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => ROOT.to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{path}"),
    }
}

/// Joins a parent path and a child name.
pub fn child(parent: &str, name: &str) -> String {
    append_paths(parent, name)
}

/// Returns `path` relative to `base` (without leading slash), or `None` if it is not below `base`.
pub fn relative_path<'a>(base: &str, path: &'a str) -> Option<&'a str> {
    if !is_same_or_descendant(base, path) {
        return None;
    }
    if base == ROOT {
        return Some(path.trim_start_matches('/'));
    }
    Some(path[base.len()..].trim_start_matches('/'))
}

/// Strips `base` from the front of `path`, keeping the result absolute.
pub fn strip_base(base: &str, path: &str) -> Option<String> {
    relative_path(base, path).map(|rel| append_paths(ROOT, rel))
}

/// Returns all proper ancestors of `path` from the top down, excluding the root.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == ROOT {
            break;
        }
        result.push(p.to_string());
        current = parent(p);
    }
    result.reverse();
    result
}

/// Returns the deepest path that is the same as or an ancestor of all given paths.
pub fn common_parent<'a, I>(paths: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = paths.into_iter();
    let mut common: String = iter.next()?.to_string();
    for path in iter {
        while !is_same_or_descendant(&common, path) {
            common = parent(&common)?.to_string();
        }
    }
    Some(common)
}
