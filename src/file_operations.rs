use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::{error, info};

use crate::error::ServerError;
use crate::http::Response;
use crate::upload::StoredFile;

/// Writes an accepted upload verbatim into `upload_dir`.
pub fn store_file(upload_dir: &Path, stored: &StoredFile, content: &[u8]) -> io::Result<PathBuf> {
    let path = upload_dir.join(&stored.stored_name);

    let mut file = fs::File::create(&path)?;
    file.write_all(content)?;
    file.flush()?;

    info!(
        "stored upload {:?} as {} ({} bytes)",
        stored.original_name,
        path.display(),
        content.len()
    );
    Ok(path)
}

pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Reads a file and answers with its bytes, a 404, or a 500 carrying the error code.
///
/// Directories are not listed; they answer 404 like a missing file.
pub fn serve_file(path: &Path) -> Response {
    if path.is_dir() {
        return Response::from_error(&ServerError::NotFound(path.display().to_string()));
    }
    match fs::read(path) {
        Ok(bytes) => Response::new(200, &content_type_for(path), bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Response::from_error(&ServerError::NotFound(path.display().to_string()))
        }
        Err(e) => {
            error!("failed to read {}: {}", path.display(), e);
            Response::from_error(&ServerError::Io(e))
        }
    }
}
