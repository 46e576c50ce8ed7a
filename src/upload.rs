//! Upload policy: body size, filename sanitizing and the extension allow-list.

use std::path::Path;

use log::warn;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Running count of request-body bytes checked against a limit.
///
/// Feed it every chunk as it is read; it fails on the chunk that crosses the limit.
#[derive(Debug, Clone)]
pub struct BodyLimit {
    limit: usize,
    seen: usize,
}

impl BodyLimit {
    pub fn new(limit: usize) -> BodyLimit {
        BodyLimit { limit, seen: 0 }
    }

    pub fn record(&mut self, bytes: usize) -> Result<(), ServerError> {
        self.seen = self.seen.saturating_add(bytes);
        if self.seen > self.limit {
            return Err(ServerError::PayloadTooLarge { limit: self.limit });
        }
        Ok(())
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Name an accepted upload is stored under, directly inside the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub stored_name: String,
    pub original_name: String,
}

/// Reduces a client filename to a bare file name.
///
/// Everything up to the last `/` or `\` is dropped; the rest is kept as sent.
/// `None` if nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");

    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}

/// Lower-cased extension with its leading dot, e.g. `.pdf`.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

pub fn check_extension(filename: &str, allowed: &[String]) -> Result<(), ServerError> {
    match extension_of(filename) {
        Some(ext) if allowed.iter().any(|a| *a == ext) => Ok(()),
        Some(ext) => Err(ServerError::UnsupportedType(ext)),
        None => Err(ServerError::UnsupportedType(String::from("(no extension)"))),
    }
}

/// `{millis}-{basename}`. Two same-name uploads in one millisecond collide.
pub fn stored_name(timestamp_millis: i64, basename: &str) -> String {
    format!("{}-{}", timestamp_millis, basename)
}

/// Applies the filename rules to a client filename and names the stored file.
pub fn validate(
    raw_filename: &str,
    config: &ServerConfig,
    timestamp_millis: i64,
) -> Result<StoredFile, ServerError> {
    let basename = match sanitize_filename(raw_filename) {
        Some(name) => name,
        None => {
            warn!("upload rejected, unusable filename {:?}", raw_filename);
            return Err(ServerError::BadRequest(format!(
                "invalid filename \"{}\"",
                raw_filename
            )));
        }
    };

    if let Err(e) = check_extension(&basename, &config.allowed_extensions) {
        warn!("upload rejected, {}: {:?}", e, basename);
        return Err(e);
    }

    Ok(StoredFile {
        stored_name: stored_name(timestamp_millis, &basename),
        original_name: raw_filename.to_string(),
    })
}
