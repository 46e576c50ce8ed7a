use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ConfigError;
use crate::security::absolute_root;

pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MiB

pub const ALLOWED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".pdf", ".txt"];

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Everything the router and transport need to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Absolute, normalized root for static files.
    pub public_dir: PathBuf,
    /// Absolute, normalized root for stored uploads.
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    /// Lower-cased extensions including the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Form field that carries the uploaded file.
    pub field_name: String,
    pub index_file: String,
    pub read_timeout: Duration,
}

impl ServerConfig {
    /// Config rooted at the given directories with every other setting at its default.
    pub fn new(public_dir: &Path, upload_dir: &Path) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            public_dir: resolve_dir(public_dir)?,
            upload_dir: resolve_dir(upload_dir)?,
            max_upload_size: MAX_UPLOAD_SIZE,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            field_name: String::from("file"),
            index_file: String::from("index.html"),
            read_timeout: Duration::from_secs(30),
        })
    }

    /// Reads `HOST`, `PORT`, `PUBLIC_DIR`, `UPLOAD_DIR` and `MAX_UPLOAD_SIZE`.
    pub fn from_env() -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<ServerConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let public_dir = lookup("PUBLIC_DIR").unwrap_or_else(|| String::from(DEFAULT_PUBLIC_DIR));
        let upload_dir = lookup("UPLOAD_DIR").unwrap_or_else(|| String::from(DEFAULT_UPLOAD_DIR));
        let mut config = ServerConfig::new(Path::new(&public_dir), Path::new(&upload_dir))?;

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        if let Some(size) = lookup("MAX_UPLOAD_SIZE") {
            config.max_upload_size = parse_number("MAX_UPLOAD_SIZE", &size)?;
        }
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}

fn resolve_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    absolute_root(dir).map_err(|source| ConfigError::Directory {
        path: dir.display().to_string(),
        source,
    })
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
