use std::{sync::Arc, time::Duration};

mod domain;
mod interfaces;
mod infrastructure;
pub mod errors;
pub mod settings;
pub mod constants;
pub mod graceful_shutdown;

pub use domain::{entities, use_cases};
pub use interfaces::{handlers, repositories, middlewares, routes};
pub use infrastructure::{auth, cache, db, imaging, limiter, storage};

use auth::jwt::JwtService;
use cache::{memory_cache::MemoryImageCache, redis_cache::RedisImageCache};
use errors::AppError;
use limiter::rate_limiter::RateLimiterStore;
use repositories::{
    account::AccountRepository,
    cache::ImageCache,
    image::ImageRepository,
    sqlx_repo::{SqlxAccountRepo, SqlxImageRepo},
    storage::ImageStorage,
    throttle::RequestThrottle,
    token::TokenServiceRepository,
};
use storage::local::LocalImageStorage;
use use_cases::{images::ImageHandler, resolver::PresetResolver};

pub struct AppState {
    pub image_handler: ImageHandler,
    pub resolver: PresetResolver,
    pub token_service: Arc<dyn TokenServiceRepository>,
    pub throttle: Arc<dyn RequestThrottle>,
    pub cache: Arc<dyn ImageCache>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Production wiring: Postgres, local media storage, Redis when configured
    /// (in-process cache otherwise) and the in-process rate limiter.
    pub fn new(config: &settings::AppConfig, pool: sqlx::PgPool) -> Result<Self, AppError> {
        let images: Arc<dyn ImageRepository> = Arc::new(SqlxImageRepo::new(pool.clone()));
        let accounts: Arc<dyn AccountRepository> = Arc::new(SqlxAccountRepo::new(pool));
        let storage: Arc<dyn ImageStorage> = Arc::new(LocalImageStorage::new(&config.media_root));

        let cache: Arc<dyn ImageCache> = match config.redis_url.as_deref() {
            Some(url) => Arc::new(RedisImageCache::new(url)?),
            None => {
                tracing::warn!("APP_REDIS_URL not set, caching derived images in process memory");
                Arc::new(MemoryImageCache::new())
            }
        };

        let throttle: Arc<dyn RequestThrottle> = Arc::new(
            RateLimiterStore::new(
                config.rate_limit_capacity,
                config.rate_limit_refill_per_sec,
                Duration::from_secs(config.rate_limit_window_secs),
                config.rate_limit_window_limit,
            )
            .with_eviction(Duration::from_secs(config.rate_limit_window_secs * 10)),
        );

        Ok(Self::with_services(
            images,
            accounts,
            storage,
            cache,
            throttle,
            Arc::new(JwtService::new(config)),
        )
        .with_max_upload_bytes(config.max_upload_bytes))
    }

    pub fn with_services(
        images: Arc<dyn ImageRepository>,
        accounts: Arc<dyn AccountRepository>,
        storage: Arc<dyn ImageStorage>,
        cache: Arc<dyn ImageCache>,
        throttle: Arc<dyn RequestThrottle>,
        token_service: Arc<dyn TokenServiceRepository>,
    ) -> Self {
        AppState {
            image_handler: ImageHandler::new(images.clone(), accounts, storage.clone(), cache.clone()),
            resolver: PresetResolver::new(images, storage, cache.clone()),
            token_service,
            throttle,
            cache,
            max_upload_bytes: settings::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}
