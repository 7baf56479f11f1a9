//! Attachment object storage.
//!
//! `ObjectStore` is the seam to the durable blob store. `LocalObjectStore`
//! writes under a directory that is served (or proxied) at a public base URL.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::shared::error::AppError;

/// Durable storage for attachment bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL it can be fetched from.
    /// Writing the same key twice is allowed and leaves one object.
    async fn put(&self, key: &str, bytes: Vec<u8>, mime_type: &str) -> Result<String, AppError>;

    /// Remove the object previously returned as `url`. Missing objects are
    /// not an error.
    async fn delete(&self, url: &str) -> Result<(), AppError>;
}

/// Filesystem-backed object store.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(AppError::Validation(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, mime_type: &str) -> Result<String, AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!(key = %key, mime_type = %mime_type, size = bytes.len(), "Object stored");
        Ok(self.url_for(key))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let Some(key) = url
            .strip_prefix(&self.public_base_url)
            .map(|k| k.trim_start_matches('/'))
        else {
            return Err(AppError::Validation(format!(
                "URL is not served by this store: {}",
                url
            )));
        };

        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("chat-engine-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_then_delete() {
        let root = temp_root();
        let store = LocalObjectStore::new(&root, "http://cdn.test/files/");

        let url = store
            .put("image/abc.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(url, "http://cdn.test/files/image/abc.png");
        assert_eq!(tokio::fs::read(root.join("image/abc.png")).await.unwrap(), vec![1, 2, 3]);

        store.delete(&url).await.unwrap();
        assert!(!root.join("image/abc.png").exists());
        // Deleting again is a no-op
        store.delete(&url).await.unwrap();

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let store = LocalObjectStore::new(temp_root(), "http://cdn.test");
        let err = store.put("../etc/passwd", vec![0], "text/plain").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = store.delete("http://elsewhere/x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
