use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;

use crate::repositories::storage::ImageStorage;

/// Stores source images on the local filesystem under `media_root`.
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    root: PathBuf,
}

impl LocalImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalImageStorage { root: root.into() }
    }

    /// Resolves a relative storage key, refusing anything that could escape the root.
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid storage path: {}", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn save(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "stored source image");
        Ok(())
    }

    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("failed to delete {}", path.display())),
        }

        // Drop the per-image directory once it is empty
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_storage() -> (LocalImageStorage, PathBuf) {
        let root = std::env::temp_dir().join(format!("image-links-{}", Uuid::new_v4()));
        (LocalImageStorage::new(&root), root)
    }

    #[actix_rt::test]
    async fn save_load_delete() {
        let (storage, root) = temp_storage();

        storage.save("user/image/a.png", b"png bytes").await.unwrap();
        assert_eq!(storage.load("user/image/a.png").await.unwrap(), b"png bytes");

        storage.delete("user/image/a.png").await.unwrap();
        assert!(storage.load("user/image/a.png").await.is_err());
        // deleting twice is fine
        storage.delete("user/image/a.png").await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }

    #[actix_rt::test]
    async fn rejects_paths_outside_root() {
        let (storage, _root) = temp_storage();
        assert!(storage.save("../escape.png", b"x").await.is_err());
        assert!(storage.load("/etc/passwd").await.is_err());
        assert!(storage.load("").await.is_err());
    }
}
