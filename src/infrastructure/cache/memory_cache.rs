use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{errors::AppError, repositories::cache::ImageCache};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process cache used when no Redis URL is configured. Expired entries are
/// dropped lazily on read.
#[derive(Clone, Default)]
pub struct MemoryImageCache {
    map: Arc<DashMap<String, Entry>>,
}

impl MemoryImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[async_trait]
impl ImageCache for MemoryImageCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let now = Instant::now();
        if let Some(entry) = self.map.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.bytes.clone()));
            }
        }
        self.map.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, bytes: &[u8], ttl_seconds: Option<u64>) -> Result<(), AppError> {
        let expires_at = ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl.max(1)));
        self.map.insert(key.to_string(), Entry { bytes: bytes.to_vec(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.map.remove(key);
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
