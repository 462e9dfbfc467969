use async_trait::async_trait;

/// Blob storage for uploaded source images, addressed by relative path.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn save(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()>;
    async fn load(&self, path: &str) -> anyhow::Result<Vec<u8>>;
    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}
