use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::repositories::storage::ImageStorage;

/// Keeps source images in memory. Used by tests and local experiments.
#[derive(Clone, Default)]
pub struct MemoryImageStorage {
    files: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl ImageStorage for MemoryImageStorage {
    async fn save(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.files.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .get(key)
            .map(|bytes| bytes.clone())
            .ok_or_else(|| anyhow!("no such file: {}", key))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.files.remove(key);
        Ok(())
    }
}
