//! Confines request paths to a root directory.

use std::{
    env, io,
    path::{Component, Path, PathBuf},
};

use log::warn;
use percent_encoding::percent_decode_str;

use crate::error::ServerError;

/// An absolute path that is its root or lies underneath it.
///
/// Only [`resolve`] builds one, so holding a `ResolvedPath` is proof the
/// containment check passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Cuts the query string and fragment off a request target.
pub fn strip_query(raw: &str) -> &str {
    match raw.find(|c: char| c == '?' || c == '#') {
        Some(end) => &raw[..end],
        None => raw,
    }
}

/// Maps a raw URL path onto `root`, rejecting anything that would land outside it.
///
/// `root` must already be absolute and normalized (see [`absolute_root`]).
pub fn resolve(root: &Path, raw_url_path: &str) -> Result<ResolvedPath, ServerError> {
    let decoded = percent_decode_str(strip_query(raw_url_path)).decode_utf8_lossy();

    if decoded.contains('\0') {
        warn!("rejected path with NUL byte: {:?}", raw_url_path);
        return Err(ServerError::Forbidden(raw_url_path.to_string()));
    }

    let relative = decoded.trim_start_matches('/');
    let joined = normalize(&root.join(relative));

    // Path::starts_with compares whole components, so "/srv/public-old" is not
    // under "/srv/public", and the root itself passes.
    if !joined.starts_with(root) {
        warn!("path traversal attempt: {:?} -> {}", raw_url_path, joined.display());
        return Err(ServerError::Forbidden(raw_url_path.to_string()));
    }

    Ok(ResolvedPath(joined))
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Makes a configured directory absolute against the working directory and normalizes it.
pub fn absolute_root(dir: &Path) -> io::Result<PathBuf> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        env::current_dir()?.join(dir)
    };
    Ok(normalize(&absolute))
}
