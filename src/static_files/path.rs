//! Request path → filesystem path, without ever leaving the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// A pathname that passed the NUL and traversal checks.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Absolute filesystem path to stat.
    pub path: PathBuf,
    /// Normalized segments below the root, used for the dotfile check.
    pub parts: Vec<String>,
}

fn segments(pathname: &str) -> impl Iterator<Item = &str> {
    pathname.split(['/', '\\'])
}

/// Lexically collapses `.` and `..`. A `..` that would climb above the
/// starting point is kept so callers can reject it.
fn normalize(pathname: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments(pathname) {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if last != ".." => {
                    out.pop();
                }
                _ => out.push("..".to_string()),
            },
            other => out.push(other.to_string()),
        }
    }
    out
}

fn has_up_segment(pathname: &str) -> bool {
    segments(pathname).any(|s| s == "..")
}

/// Resolves `pathname` under `root`, or under the working directory when there is none.
pub fn resolve(pathname: &str, root: Option<&Path>) -> Result<ResolvedPath> {
    if pathname.contains('\0') {
        return Err(Error::BadRequest("path contains a NUL byte".into()));
    }

    match root {
        Some(root) => {
            let parts = normalize(pathname);
            if parts.iter().any(|p| p == "..") {
                tracing::debug!(pathname, "Rejected path escaping the root");
                return Err(Error::Forbidden(format!("malicious path {pathname:?}")));
            }
            let root = std::path::absolute(root)?;
            let path = parts.iter().fold(root, |acc, part| acc.join(part));
            Ok(ResolvedPath { path, parts })
        }
        None => {
            if has_up_segment(pathname) {
                tracing::debug!(pathname, "Rejected relative path without a root");
                return Err(Error::Forbidden(format!("malicious path {pathname:?}")));
            }
            let parts = normalize(pathname);
            let path = std::path::absolute(Path::new(pathname))?;
            Ok(ResolvedPath { path, parts })
        }
    }
}

/// Resolves a filesystem path (not URL text) under `root`, with the same
/// traversal rules as [`resolve`]. Non-UTF-8 names pass through intact.
pub fn resolve_path(path: &Path, root: Option<&Path>) -> Result<ResolvedPath> {
    if path.as_os_str().as_encoded_bytes().contains(&0) {
        return Err(Error::BadRequest("path contains a NUL byte".into()));
    }

    let mut kept: Vec<&std::ffi::OsStr> = Vec::new();
    let mut escapes = false;
    for component in path.components() {
        match component {
            Component::Normal(name) => kept.push(name),
            Component::ParentDir => {
                if root.is_none() || kept.pop().is_none() {
                    escapes = true;
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if escapes {
        tracing::debug!(path = %path.display(), "Rejected path escaping the root");
        return Err(Error::Forbidden(format!("malicious path {:?}", path.display().to_string())));
    }

    let parts = kept.iter().map(|name| name.to_string_lossy().into_owned()).collect();
    let path = match root {
        Some(root) => kept.iter().fold(std::path::absolute(root)?, |acc, name| acc.join(name)),
        None => std::path::absolute(path)?,
    };
    Ok(ResolvedPath { path, parts })
}

/// True when any segment is hidden (`.name`, but not `.` itself).
pub fn contains_dotfile(parts: &[String]) -> bool {
    parts.iter().any(|p| p.len() > 1 && p.starts_with('.'))
}
