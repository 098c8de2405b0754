//! Redis cache backend.

use super::{CacheResult, CacheStore};
use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use std::time::Duration;

/// Cache backed by a shared Redis instance.
///
/// Values are written with `SET .. PX` so sub-second TTLs survive; expiry is
/// read back with `PTTL`.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Connection string, e.g. `redis://127.0.0.1:6379/0`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        log::info!("Connected to Redis cache");
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        // PX 0 is rejected by Redis
        let millis = ttl.as_millis().max(1) as u64;
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let millis = redis::cmd("PTTL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await?;

        // -2: missing key, -1: key without expiry
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
