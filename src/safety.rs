//! Path-safety primitives shared by packing and extraction.
//!
//! Archive member paths are untrusted. Before anything touches the
//! filesystem, extraction strips absolute roots, rejects `..` components,
//! bounds the nesting depth and verifies the resolved target stays under
//! the extraction root. Packing uses the same root stripping so archives
//! never carry absolute paths unless asked to.

use std::path::{Component, Path, PathBuf};

/// Default limit on the number of path components during extraction.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Splits a path into its absolute root and the relative remainder.
///
/// Roots are stripped repeatedly, so `"//c:/x"` yields `("//c:/", "x")`.
/// Recognised roots are runs of `/` or `\`, Windows drive prefixes (`c:`)
/// and the `//?/` device prefix.
///
/// # Examples
///
/// ```rust
/// use tarstream::safety::strip_absolute_path;
///
/// assert_eq!(strip_absolute_path("/etc/passwd"), ("/".to_string(), "etc/passwd"));
/// assert_eq!(strip_absolute_path("c:\\temp"), ("c:\\".to_string(), "temp"));
/// assert_eq!(strip_absolute_path("rel/path"), (String::new(), "rel/path"));
/// ```
pub fn strip_absolute_path(path: &str) -> (String, &str) {
    let mut root = String::new();
    let mut rest = path;
    loop {
        let len = root_len(rest);
        if len == 0 {
            break;
        }
        root.push_str(&rest[..len]);
        rest = &rest[len..];
    }
    (root, rest)
}

fn root_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    let is_sep = |b: u8| b == b'/' || b == b'\\';
    if bytes.len() >= 4 && is_sep(bytes[0]) && is_sep(bytes[1]) && bytes[2] == b'?' && is_sep(bytes[3])
    {
        return 4;
    }
    let start = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        2
    } else {
        0
    };
    start + bytes[start..].iter().take_while(|&&b| is_sep(b)).count()
}

/// Returns true if any component of `path` is `..`.
pub fn has_parent_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|part| part == "..")
}

/// Number of `/`-separated parts in `path`.
pub fn path_depth(path: &str) -> usize {
    path.trim_end_matches('/').split('/').count()
}

/// Removes the first `count` components of `path`.
///
/// Returns `None` when nothing would be left.
pub fn strip_components(path: &str, count: usize) -> Option<String> {
    if count == 0 {
        return Some(path.to_string());
    }
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= count {
        return None;
    }
    let stripped = parts[count..].join("/");
    if stripped.is_empty() || stripped == "/" {
        None
    } else {
        Some(stripped)
    }
}

/// Joins `relative` onto `root` and resolves `.` and `..` lexically.
///
/// The filesystem is not consulted, so symlinks are not followed.
pub fn resolve_lexically(root: &Path, relative: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in root.join(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Returns true if `path` is `root` or lies below it.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}
