//! String helpers for absolute, `/`-separated source filesystem paths.
//!
//! Replica rows store paths without a trailing slash; backup roots are stored
//! with one so that prefix checks cannot match a sibling like `/backup2`.

pub const ROOT: &str = "/";

pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// `"/a/b"` and `"/a/b/"` both become `"/a/b/"`.
pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Strips one trailing slash, leaving the root untouched.
pub fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// True when `path` equals `dir` or lives somewhere below it.
pub fn is_under(path: &str, dir: &str) -> bool {
    with_trailing_slash(path).starts_with(&with_trailing_slash(dir))
}

/// Replaces a leading `from` with `to`. Returns `None` when `path` does not start with `from`.
pub fn replace_prefix(path: &str, from: &str, to: &str) -> Option<String> {
    path.strip_prefix(from).map(|rest| format!("{}{}", to, rest))
}
