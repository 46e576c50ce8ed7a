//! A small HTTP file server: static files from a public root, previously
//! uploaded files from an upload root, and single-file multipart uploads.

pub mod config;
pub mod error;
pub mod file_operations;
pub mod http;
pub mod multipart;
pub mod pages;
pub mod router;
pub mod security;
pub mod server;
pub mod upload;

pub use config::ServerConfig;
pub use error::{ConfigError, ServerError};
pub use router::Router;
pub use server::Server;
