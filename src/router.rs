//! Picks one branch per request and turns its outcome into a response.

use chrono::Utc;
use log::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::file_operations::{serve_file, store_file};
use crate::http::{Method, Request, Response};
use crate::multipart::{find_file_part, get_boundary};
use crate::pages::upload_success_page;
use crate::security::resolve;
use crate::upload::{validate, BodyLimit, StoredFile};

pub const UPLOAD_PATH: &str = "/upload";
pub const UPLOADS_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Upload,
    MethodNotAllowed,
    Index,
    /// Path below `/uploads`, still including the leading `/`.
    Uploads(&'a str),
    Public(&'a str),
}

/// Chooses the branch for `method` and a query-free `path`.
pub fn route<'a>(method: &Method, path: &'a str) -> Route<'a> {
    if *method == Method::Post && path == UPLOAD_PATH {
        return Route::Upload;
    }
    if *method != Method::Get && *method != Method::Head {
        return Route::MethodNotAllowed;
    }
    if path == "/" || path == "/index.html" {
        return Route::Index;
    }
    if path.starts_with(UPLOADS_PREFIX) {
        return Route::Uploads(&path[UPLOADS_PREFIX.len() - 1..]);
    }
    Route::Public(path)
}

pub struct Router {
    config: ServerConfig,
}

impl Router {
    pub fn new(config: ServerConfig) -> Router {
        Router { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handle(&self, request: &Request) -> Response {
        match route(&request.method, request.path()) {
            Route::Upload => match self.store_upload(request) {
                Ok(stored) => Response::html(
                    200,
                    upload_success_page(&stored.original_name, &stored.stored_name),
                ),
                Err(e) => Response::from_error(&e),
            },
            Route::MethodNotAllowed => {
                Response::from_error(&ServerError::MethodNotAllowed(request.method.to_string()))
            }
            Route::Index => serve_file(&self.config.public_dir.join(&self.config.index_file)),
            Route::Uploads(rest) => match resolve(&self.config.upload_dir, rest) {
                Ok(path) => serve_file(path.as_path()),
                Err(e) => Response::from_error(&e),
            },
            Route::Public(path) => match resolve(&self.config.public_dir, path) {
                Ok(path) => serve_file(path.as_path()),
                Err(e) => Response::from_error(&e),
            },
        }
    }

    /// Boundary of an upload request; checked before any body byte is read.
    pub fn upload_boundary(&self, request: &Request) -> Result<String, ServerError> {
        let content_type = request.header("content-type").unwrap_or("");
        get_boundary(content_type).ok_or_else(|| {
            warn!("upload without multipart boundary, content type {:?}", content_type);
            ServerError::BadRequest(String::from(
                "expected multipart/form-data with a boundary parameter",
            ))
        })
    }

    /// Parses a fully buffered upload body and writes the first file field to disk.
    pub fn store_upload(&self, request: &Request) -> Result<StoredFile, ServerError> {
        let boundary = self.upload_boundary(request)?;
        BodyLimit::new(self.config.max_upload_size).record(request.body.len())?;

        let part = match find_file_part(&request.body, &boundary, &self.config.field_name) {
            Some(part) => part,
            None => {
                warn!("upload without a \"{}\" file field", self.config.field_name);
                return Err(ServerError::NoFile(self.config.field_name.clone()));
            }
        };

        let stored = validate(&part.filename, &self.config, Utc::now().timestamp_millis())?;
        store_file(&self.config.upload_dir, &stored, part.body)?;
        info!("upload {:?} accepted as {}", stored.original_name, stored.stored_name);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _public: TempDir,
        _uploads: TempDir,
        router: Router,
    }

    fn fixture() -> Fixture {
        let public = tempdir().unwrap();
        let uploads = tempdir().unwrap();
        fs::write(public.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(public.path().join("style.css"), "body{}").unwrap();
        let config = ServerConfig::new(public.path(), uploads.path()).unwrap();
        Fixture {
            _public: public,
            _uploads: uploads,
            router: Router::new(config),
        }
    }

    fn upload(filename: &str, content: &[u8]) -> Request {
        let mut body = format!(
            "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            filename
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n--XYZ--\r\n");
        Request::new(Method::Post, "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_body(body)
    }

    fn upload_count(router: &Router) -> usize {
        fs::read_dir(&router.config().upload_dir).unwrap().count()
    }

    #[test]
    fn routes_by_method_and_path() {
        assert_eq!(route(&Method::Post, "/upload"), Route::Upload);
        assert_eq!(route(&Method::Post, "/other"), Route::MethodNotAllowed);
        assert_eq!(route(&Method::Other("PUT".into()), "/"), Route::MethodNotAllowed);
        assert_eq!(route(&Method::Get, "/"), Route::Index);
        assert_eq!(route(&Method::Head, "/index.html"), Route::Index);
        assert_eq!(route(&Method::Get, "/uploads/1-a.txt"), Route::Uploads("/1-a.txt"));
        assert_eq!(route(&Method::Get, "/img/a.png"), Route::Public("/img/a.png"));
        assert_eq!(route(&Method::Get, "/upload"), Route::Public("/upload"));
    }

    #[test]
    fn index_and_static_files() {
        let f = fixture();
        let index = f.router.handle(&Request::new(Method::Get, "/"));
        assert_eq!(index.status, 200);
        assert_eq!(index.content_type, "text/html");
        assert_eq!(index.body, b"<h1>home</h1>");

        let css = f.router.handle(&Request::new(Method::Get, "/style.css?v=2"));
        assert_eq!(css.status, 200);
        assert_eq!(css.content_type, "text/css");
    }

    #[test]
    fn directory_targets_are_404() {
        let f = fixture();
        assert_eq!(f.router.handle(&Request::new(Method::Get, "/uploads/")).status, 404);
        assert_eq!(f.router.handle(&Request::new(Method::Get, "/uploads")).status, 404);
    }

    #[test]
    fn traversal_is_403() {
        let f = fixture();
        let response = f.router.handle(&Request::new(Method::Get, "/../../etc/passwd"));
        assert_eq!(response.status, 403);
        let response = f.router.handle(&Request::new(Method::Get, "/uploads/..%2f..%2fetc%2fpasswd"));
        assert_eq!(response.status, 403);
    }

    #[test]
    fn missing_file_is_404() {
        let f = fixture();
        let response = f.router.handle(&Request::new(Method::Get, "/nonexistent.html"));
        assert_eq!(response.status, 404);
        assert!(String::from_utf8_lossy(&response.body).contains("404"));
    }

    #[test]
    fn other_methods_are_405() {
        let f = fixture();
        let response = f.router.handle(&Request::new(Method::Other("DELETE".into()), "/style.css"));
        assert_eq!(response.status, 405);
    }

    #[test]
    fn pdf_upload_round_trip() {
        let f = fixture();
        let content = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\nbinary\r\n\r\nstuff";
        let response = f.router.handle(&upload("report.pdf", content));
        assert_eq!(response.status, 200);

        let page = String::from_utf8(response.body).unwrap();
        let start = page.find("/uploads/").unwrap();
        let end = start + page[start..].find('"').unwrap();
        let link = &page[start..end];
        let name = &link["/uploads/".len()..];
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(rest, "report.pdf");

        let fetched = f.router.handle(&Request::new(Method::Get, link));
        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.content_type, "application/pdf");
        assert_eq!(fetched.body, content);
    }

    #[test]
    fn client_directories_are_not_created() {
        let f = fixture();
        let stored = f.router.store_upload(&upload("../../nested/dir/notes.txt", b"hi")).unwrap();
        assert!(stored.stored_name.ends_with("-notes.txt"));
        let path = f.router.config().upload_dir.join(&stored.stored_name);
        assert_eq!(path.parent().unwrap(), f.router.config().upload_dir.as_path());
        assert_eq!(fs::read(path).unwrap(), b"hi");
    }

    #[test]
    fn filename_is_stored_as_sent() {
        let f = fixture();
        let stored = f.router.store_upload(&upload("my report&amp;co.pdf", b"%PDF")).unwrap();
        assert!(stored.stored_name.ends_with("-my report&amp;co.pdf"));
        assert_eq!(stored.original_name, "my report&amp;co.pdf");
        assert!(f.router.config().upload_dir.join(&stored.stored_name).is_file());
    }

    #[test]
    fn disallowed_extension_is_415_and_writes_nothing() {
        let f = fixture();
        let response = f.router.handle(&upload("virus.exe", b"MZ"));
        assert_eq!(response.status, 415);
        assert_eq!(upload_count(&f.router), 0);
    }

    #[test]
    fn missing_boundary_is_400() {
        let f = fixture();
        let request = Request::new(Method::Post, "/upload")
            .with_header("Content-Type", "multipart/form-data")
            .with_body(b"--XYZ\r\n".to_vec());
        assert_eq!(f.router.handle(&request).status, 400);
        assert!(f.router.upload_boundary(&request).is_err());
    }

    #[test]
    fn no_file_field_is_400() {
        let f = fixture();
        let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--XYZ--\r\n";
        let request = Request::new(Method::Post, "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_body(body.to_vec());
        let err = f.router.store_upload(&request).unwrap_err();
        assert!(matches!(err, ServerError::NoFile(_)));
        assert_eq!(upload_count(&f.router), 0);
    }

    #[test]
    fn oversized_buffered_body_is_413() {
        let public = tempdir().unwrap();
        let uploads = tempdir().unwrap();
        let mut config = ServerConfig::new(public.path(), uploads.path()).unwrap();
        config.max_upload_size = 16;
        let router = Router::new(config);

        let response = router.handle(&upload("a.txt", b"this is far more than sixteen bytes"));
        assert_eq!(response.status, 413);
        assert!(fs::read_dir(uploads.path()).unwrap().next().is_none());
    }

    #[test]
    fn upload_dir_is_served_separately() {
        let f = fixture();
        fs::write(f.router.config().upload_dir.join("1-x.txt"), "x").unwrap();
        let public_miss = f.router.handle(&Request::new(Method::Get, "/1-x.txt"));
        assert_eq!(public_miss.status, 404);
        let hit = f.router.handle(&Request::new(Method::Get, "/uploads/1-x.txt"));
        assert_eq!(hit.status, 200);
        assert!(Path::new(&f.router.config().upload_dir).is_absolute());
    }
}
