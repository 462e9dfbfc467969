use std::sync::Arc;

use chrono::Utc;
use image::ImageFormat;
use uuid::Uuid;

use crate::{
    errors::AppError,
    imaging::resize::transform,
    repositories::{cache::ImageCache, image::ImageRepository, storage::ImageStorage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    pub cache: CacheStatus,
}

/// Turns a link id into derived image bytes, going through the cache.
///
/// Unknown and expired links both surface as `NotFound`. Concurrent misses
/// for the same link may both transform and store; the transform is a pure
/// function of the source and preset, so the last store wins harmlessly.
#[derive(Clone)]
pub struct PresetResolver {
    images: Arc<dyn ImageRepository>,
    storage: Arc<dyn ImageStorage>,
    cache: Arc<dyn ImageCache>,
}

impl PresetResolver {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        storage: Arc<dyn ImageStorage>,
        cache: Arc<dyn ImageCache>,
    ) -> Self {
        PresetResolver { images, storage, cache }
    }

    pub async fn resolve(&self, id: &Uuid) -> Result<ResolvedImage, AppError> {
        let now = Utc::now();
        let resolvable = self
            .images
            .find_link(id)
            .await?
            .filter(|resolvable| !resolvable.link.is_expired_at(now))
            .ok_or_else(|| AppError::NotFound("No image matches the given query".to_string()))?;

        let filename = resolvable.suggested_filename();
        let content_type = content_type_for(&filename);
        let key = id.to_string();

        if let Some(bytes) = self.cache.get(&key).await? {
            tracing::info!(image_url_id = %id, backend = self.cache.backend(), "cache hit");
            return Ok(ResolvedImage { bytes, filename, content_type, cache: CacheStatus::Hit });
        }

        let source = self
            .storage
            .load(&resolvable.image.image_path)
            .await
            .map_err(|e| AppError::TransformFailure(format!("cannot read source image: {e:#}")))?;

        let preset = resolvable.preset.clone();
        let bytes = tokio::task::spawn_blocking(move || transform(&source, &preset))
            .await
            .map_err(|e| AppError::InternalError(format!("Transform task failed: {}", e)))?
            .inspect_err(|e| tracing::error!(image_url_id = %id, error = %e, "transform failed"))?;

        let ttl = resolvable
            .link
            .expire_in_at(now)
            .map(|seconds| seconds.max(1) as u64);
        self.cache.set(&key, &bytes, ttl).await?;

        tracing::info!(
            image_url_id = %id,
            backend = self.cache.backend(),
            ttl = ?ttl,
            size = bytes.len(),
            "cache miss"
        );

        Ok(ResolvedImage { bytes, filename, content_type, cache: CacheStatus::Miss })
    }
}

/// Content type from a file name's extension.
pub fn content_type_for(filename: &str) -> &'static str {
    ImageFormat::from_path(filename)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}
