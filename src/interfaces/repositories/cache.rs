use async_trait::async_trait;

use crate::errors::AppError;

/// Key-value store for derived image bytes.
#[async_trait]
pub trait ImageCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    /// Stores `bytes` under `key`. `None` keeps the entry until evicted.
    async fn set(&self, key: &str, bytes: &[u8], ttl_seconds: Option<u64>) -> Result<(), AppError>;

    /// Drops the entry if present.
    async fn delete(&self, key: &str) -> Result<(), AppError>;

    async fn check_connection(&self) -> Result<(), AppError>;

    fn backend(&self) -> &'static str;
}
