use std::io;

use thiserror::Error;

/// Every way a single request can end in something other than a 200.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no file field named \"{0}\" with a filename was found")]
    NoFile(String),

    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("files of type \"{0}\" are not accepted")]
    UnsupportedType(String),

    #[error("path escapes its root: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) | ServerError::NoFile(_) => 400,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::UnsupportedType(_) => 415,
            ServerError::Io(_) => 500,
        }
    }

    /// Message shown to the client. I/O failures expose only the error code.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Io(e) => format!("Internal error ({})", io_error_code(e)),
            ServerError::Forbidden(_) => String::from("Access to this path is forbidden"),
            ServerError::NotFound(_) => String::from("The requested file does not exist"),
            other => other.to_string(),
        }
    }
}

/// Short code for an I/O error, preferring the OS errno when there is one.
pub fn io_error_code(e: &io::Error) -> String {
    match e.raw_os_error() {
        Some(code) => format!("{:?}, os error {}", e.kind(), code),
        None => format!("{:?}", e.kind()),
    }
}

/// Errors raised while reading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got \"{value}\"")]
    InvalidNumber { name: &'static str, value: String },

    #[error("cannot resolve directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: io::Error,
    },
}
