//! Key-value cache with per-key expiry.
//!
//! Failed-attempt counters, lockout flags and user lockout entries all live in a
//! [`CacheStore`]. Two backends are provided:
//!
//! - [`MemoryCache`]: process-local map, suitable for a single server process and tests
//! - [`RedisCache`]: shared store for multi-process deployments; also lets the
//!   admin CLI see and clear the server's lockout state
//!
//! Every operation is a single command against one key. There is no atomicity
//! across keys and no compare-and-set, so concurrent read-modify-write callers
//! may undercount.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCache;
pub use redis_store::RedisCache;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Stored value could not be interpreted
    #[error("Corrupt cache value for {key}: {reason}")]
    CorruptValue { key: String, reason: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Minimal key-value interface with TTL support.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove a key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remaining lifetime of a key.
    ///
    /// Returns `None` when the key is missing or the backend cannot report
    /// expiry; callers fall back to their configured duration.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Short name of the backend, used in status reports.
    fn backend_name(&self) -> &'static str;
}

/// Round-trip a probe key through the store.
///
/// Returns `Ok(true)` when the value read back matches what was written.
/// Each call uses its own key, so concurrent health checks against a shared store
/// do not disturb each other.
pub async fn probe(cache: &dyn CacheStore) -> CacheResult<bool> {
    let token = Uuid::new_v4().to_string();
    let key = format!("{PROBE_KEY_PREFIX}:{token}");

    cache.set(&key, &token, Duration::from_secs(60)).await?;
    let read_back = cache.get(&key).await?;
    cache.delete(&key).await?;

    Ok(read_back.as_deref() == Some(token.as_str()))
}

const PROBE_KEY_PREFIX: &str = "security_status_test";
