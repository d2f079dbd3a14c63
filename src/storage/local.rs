use super::{StorageBackend, StorageError, join_url, validate_path};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    /// Creates `root` if it does not exist yet.
    pub fn new(root: PathBuf, public_url: String) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        tracing::info!("LocalStorage initialized at {:?}", root);
        Ok(Self { root, public_url })
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn disk(&self) -> &'static str {
        "local"
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        tracing::debug!("LocalStorage: put {:?}", full);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.full_path(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.public_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("listing-backend-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn put_then_delete() {
        let root = temp_root();
        let storage = LocalStorage::new(root.clone(), "http://localhost/media".into()).unwrap();

        storage
            .put("properties/1/x/photo.jpg", b"jpeg".to_vec(), "image/jpeg")
            .await
            .unwrap();
        let written = tokio::fs::read(root.join("properties/1/x/photo.jpg")).await.unwrap();
        assert_eq!(written, b"jpeg");

        storage.delete("properties/1/x/photo.jpg").await.unwrap();
        // Deleting twice is fine
        storage.delete("properties/1/x/photo.jpg").await.unwrap();

        assert!(storage.put("../escape.jpg", vec![], "image/jpeg").await.is_err());
        assert_eq!(
            storage.url("properties/1/x/photo.jpg"),
            "http://localhost/media/properties/1/x/photo.jpg"
        );

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
