//! Storage backends for uploaded media.
//!
//! - `local`: files under `MEDIA_ROOT`, served by the app at `/media`
//! - `bunny`: a Bunny CDN storage zone over its HTTP API

pub mod bunny;
pub mod local;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, MediaDisk};

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Remote(String),
    InvalidPath(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Remote(msg) => write!(f, "Remote storage error: {}", msg),
            StorageError::InvalidPath(path) => write!(f, "Invalid storage path: {}", path),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Remote(e.to_string())
    }
}

/// Relative storage paths must stay inside the disk root.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(StorageError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name recorded in `media.disk`.
    fn disk(&self) -> &'static str;

    async fn put(&self, path: &str, data: Vec<u8>, content_type: &str)
    -> Result<(), StorageError>;

    /// Missing files are not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Public URL for a stored path.
    fn url(&self, path: &str) -> String;
}

pub type Storage = Arc<dyn StorageBackend>;

pub fn from_config(config: &Config, http: reqwest::Client) -> Result<Storage, StorageError> {
    match config.media_disk {
        MediaDisk::Local => Ok(Arc::new(local::LocalStorage::new(
            config.media_root.clone().into(),
            config.media_public_url.clone(),
        )?)),
        MediaDisk::Bunny => {
            let zone = config
                .bunny_storage_zone
                .clone()
                .ok_or_else(|| StorageError::Remote("BUNNY_STORAGE_ZONE is not set".into()))?;
            let key = config
                .bunny_access_key
                .clone()
                .ok_or_else(|| StorageError::Remote("BUNNY_ACCESS_KEY is not set".into()))?;
            Ok(Arc::new(bunny::BunnyStorage::new(
                http,
                config.bunny_storage_host.clone(),
                zone,
                key,
                config.media_public_url.clone(),
            )))
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_path("properties/1/abc/photo.jpg").is_ok());
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("/abs/path").is_err());
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn urls_join_cleanly() {
        assert_eq!(join_url("https://cdn.example.com/", "/a/b.jpg"), "https://cdn.example.com/a/b.jpg");
    }
}
