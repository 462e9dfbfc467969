use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, RedisResult};

use crate::{errors::AppError, repositories::cache::ImageCache};

const KEY_PREFIX: &str = "image_url";

/// Redis-backed cache of derived images.
#[derive(Clone)]
pub struct RedisImageCache {
    pool: Pool,
}

impl RedisImageCache {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AppError::InternalError(format!("Redis pool creation error: {}", e)))?;
        Ok(RedisImageCache { pool })
    }

    fn key(key: &str) -> String {
        format!("{}:{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl ImageCache for RedisImageCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.pool.get().await?;
        let bytes: Option<Vec<u8>> = conn.get(Self::key(key)).await?;
        Ok(bytes)
    }

    async fn set(&self, key: &str, bytes: &[u8], ttl_seconds: Option<u64>) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(Self::key(key), bytes, ttl.max(1)).await?,
            None => conn.set::<_, _, ()>(Self::key(key), bytes).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(Self::key(key)).await?;
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        let pong: RedisResult<String> = conn.ping().await;
        match pong {
            Ok(reply) if reply == "PONG" => Ok(()),
            Ok(reply) => Err(AppError::InternalError(format!("Unexpected PING reply: {}", reply))),
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
