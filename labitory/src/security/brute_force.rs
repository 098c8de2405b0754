//! Failed-attempt counting and identifier lockout.

use super::{
    config::SecuritySettings,
    errors::{SecurityError, SecurityResult},
};
use crate::cache::{CacheError, CacheStore};
use std::{sync::Arc, time::Duration};

/// Namespace for login attempts
pub const LOGIN: &str = "login";

/// Namespace for password reset attempts
pub const PASSWORD_RESET: &str = "password_reset";

fn attempts_key(identifier: &str, attempt_type: &str) -> String {
    format!("auth_attempts:{attempt_type}:{identifier}")
}

fn lockout_key(identifier: &str, attempt_type: &str) -> String {
    format!("auth_lockout:{attempt_type}:{identifier}")
}

/// Counts failures per identifier and locks identifiers out past a threshold.
///
/// An identifier is any string the caller tracks: an IP address, a username
/// or an email. Each `(attempt_type, identifier)` pair has its own counter and
/// lockout flag; the login flow checks the IP and the username separately and
/// treats either lockout as a rejection.
///
/// Counters are read-modify-write with no compare-and-set, so two concurrent
/// failures may count as one.
#[derive(Clone)]
pub struct BruteForceProtection {
    cache: Arc<dyn CacheStore>,
    settings: SecuritySettings,
}

impl BruteForceProtection {
    /// Create a new brute-force protector
    ///
    /// # Arguments
    ///
    /// * `cache` - Store holding counters and lockout flags
    /// * `settings` - Threshold, window and lockout duration
    pub fn new(cache: Arc<dyn CacheStore>, settings: SecuritySettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> &SecuritySettings {
        &self.settings
    }

    /// Record a failed attempt
    ///
    /// The counter is rewritten with a fresh attempt-window TTL on every
    /// failure. Once it reaches `max_failed_attempts` a lockout flag is set for
    /// `lockout_duration`.
    ///
    /// # Returns
    ///
    /// * `true` if this attempt triggered (or refreshed) a lockout; always
    ///   `false` when rate limiting is disabled
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or written.
    pub async fn record_failed_attempt(
        &self,
        identifier: &str,
        attempt_type: &str,
    ) -> SecurityResult<bool> {
        if !self.settings.rate_limit_enabled {
            return Ok(false);
        }

        let key = attempts_key(identifier, attempt_type);
        let attempts = self.read_count(&key).await? + 1;
        self.cache
            .set(&key, &attempts.to_string(), self.settings.attempt_window())
            .await?;

        let max_attempts = self.settings.max_failed_attempts;
        if attempts >= max_attempts {
            self.cache
                .set(
                    &lockout_key(identifier, attempt_type),
                    "1",
                    self.settings.lockout_duration(),
                )
                .await?;

            log::warn!(
                "Locked out {} after {} failed {} attempts",
                identifier,
                attempts,
                attempt_type
            );
            return Ok(true);
        }

        log::info!(
            "Failed {} attempt {}/{} for {}",
            attempt_type,
            attempts,
            max_attempts,
            identifier
        );
        Ok(false)
    }

    /// Check whether an identifier is locked out
    ///
    /// Always `false` when rate limiting is disabled.
    pub async fn is_locked_out(&self, identifier: &str, attempt_type: &str) -> SecurityResult<bool> {
        if !self.settings.rate_limit_enabled {
            return Ok(false);
        }

        let flag = self
            .cache
            .get(&lockout_key(identifier, attempt_type))
            .await?;
        Ok(flag.is_some())
    }

    /// Seconds until an identifier's lockout ends
    ///
    /// Returns 0 when not locked out or when rate limiting is disabled. Falls
    /// back to the configured lockout duration if the store cannot report a
    /// TTL for the flag.
    pub async fn get_lockout_time_remaining(
        &self,
        identifier: &str,
        attempt_type: &str,
    ) -> SecurityResult<u64> {
        if !self.is_locked_out(identifier, attempt_type).await? {
            return Ok(0);
        }

        let remaining = self
            .cache
            .ttl(&lockout_key(identifier, attempt_type))
            .await?;

        Ok(match remaining {
            // Round up so a live lockout never reports 0
            Some(ttl) => ceil_secs(ttl),
            None => self.settings.lockout_duration_secs,
        })
    }

    /// Delete the counter and the lockout flag
    ///
    /// Runs even when rate limiting is disabled.
    pub async fn clear_failed_attempts(&self, identifier: &str, attempt_type: &str) -> SecurityResult<()> {
        self.cache
            .delete(&attempts_key(identifier, attempt_type))
            .await?;
        self.cache
            .delete(&lockout_key(identifier, attempt_type))
            .await?;

        log::info!("Cleared failed {} attempts for {}", attempt_type, identifier);
        Ok(())
    }

    /// Current failure count, 0 if none recorded
    pub async fn get_failed_attempt_count(
        &self,
        identifier: &str,
        attempt_type: &str,
    ) -> SecurityResult<u32> {
        self.read_count(&attempts_key(identifier, attempt_type))
            .await
    }

    async fn read_count(&self, key: &str) -> SecurityResult<u32> {
        match self.cache.get(key).await? {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                SecurityError::from(CacheError::CorruptValue {
                    key: key.to_string(),
                    reason: format!("expected an attempt count, found {raw:?}"),
                })
            }),
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use proptest::prelude::*;

    fn protection(settings: SecuritySettings) -> (BruteForceProtection, MemoryCache) {
        let cache = MemoryCache::new();
        (
            BruteForceProtection::new(Arc::new(cache.clone()), settings),
            cache,
        )
    }

    #[tokio::test]
    async fn test_threshold_triggers_lockout() {
        let (bf, _) = protection(SecuritySettings::default());

        for _ in 0..4 {
            assert!(!bf.record_failed_attempt("alice", LOGIN).await.unwrap());
        }
        assert!(!bf.is_locked_out("alice", LOGIN).await.unwrap());

        assert!(bf.record_failed_attempt("alice", LOGIN).await.unwrap());
        assert!(bf.is_locked_out("alice", LOGIN).await.unwrap());
        assert_eq!(bf.get_failed_attempt_count("alice", LOGIN).await.unwrap(), 5);

        let remaining = bf.get_lockout_time_remaining("alice", LOGIN).await.unwrap();
        assert!(remaining > 1790 && remaining <= 1800);
    }

    #[tokio::test]
    async fn test_clear_resets_count_and_lockout() {
        let (bf, _) = protection(SecuritySettings::default());
        for _ in 0..5 {
            bf.record_failed_attempt("10.0.0.1", LOGIN).await.unwrap();
        }

        bf.clear_failed_attempts("10.0.0.1", LOGIN).await.unwrap();

        assert_eq!(bf.get_failed_attempt_count("10.0.0.1", LOGIN).await.unwrap(), 0);
        assert!(!bf.is_locked_out("10.0.0.1", LOGIN).await.unwrap());
        assert_eq!(bf.get_lockout_time_remaining("10.0.0.1", LOGIN).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let (bf, _) = protection(SecuritySettings::default());
        for _ in 0..5 {
            bf.record_failed_attempt("alice", PASSWORD_RESET).await.unwrap();
        }

        assert!(bf.is_locked_out("alice", PASSWORD_RESET).await.unwrap());
        assert!(!bf.is_locked_out("alice", LOGIN).await.unwrap());
        assert_eq!(bf.get_failed_attempt_count("alice", LOGIN).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let settings = SecuritySettings {
            rate_limit_enabled: false,
            ..SecuritySettings::default()
        };
        let (bf, cache) = protection(settings);

        for _ in 0..10 {
            assert!(!bf.record_failed_attempt("alice", LOGIN).await.unwrap());
        }

        assert!(cache.is_empty().await);
        assert!(!bf.is_locked_out("alice", LOGIN).await.unwrap());
        assert_eq!(bf.get_lockout_time_remaining("alice", LOGIN).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_ignores_existing_flag() {
        let cache = MemoryCache::new();
        let enabled = BruteForceProtection::new(Arc::new(cache.clone()), SecuritySettings::default());
        for _ in 0..5 {
            enabled.record_failed_attempt("bob", LOGIN).await.unwrap();
        }

        let disabled = BruteForceProtection::new(
            Arc::new(cache),
            SecuritySettings {
                rate_limit_enabled: false,
                ..SecuritySettings::default()
            },
        );
        assert!(!disabled.is_locked_out("bob", LOGIN).await.unwrap());
        // Raw count is still visible
        assert_eq!(disabled.get_failed_attempt_count("bob", LOGIN).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_lockout_expires_with_ttl() {
        let settings = SecuritySettings {
            max_failed_attempts: 2,
            lockout_duration_secs: 1,
            ..SecuritySettings::default()
        };
        let (bf, _) = protection(settings);

        bf.record_failed_attempt("carol", LOGIN).await.unwrap();
        assert!(bf.record_failed_attempt("carol", LOGIN).await.unwrap());
        assert!(bf.is_locked_out("carol", LOGIN).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(!bf.is_locked_out("carol", LOGIN).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_counter_is_reported() {
        let (bf, cache) = protection(SecuritySettings::default());
        cache
            .set("auth_attempts:login:dave", "lots", Duration::from_secs(60))
            .await
            .unwrap();

        let err = bf.get_failed_attempt_count("dave", LOGIN).await.unwrap_err();
        assert!(matches!(
            err,
            SecurityError::Cache(CacheError::CorruptValue { .. })
        ));
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_locked_exactly_at_threshold(max in 1u32..8, failures in 0u32..12) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            runtime.block_on(async {
                let settings = SecuritySettings {
                    max_failed_attempts: max,
                    ..SecuritySettings::default()
                };
                let (bf, _) = protection(settings);

                for _ in 0..failures {
                    bf.record_failed_attempt("prop", LOGIN).await.unwrap();
                }

                let locked = bf.is_locked_out("prop", LOGIN).await.unwrap();
                prop_assert_eq!(locked, failures >= max);
                prop_assert_eq!(
                    bf.get_failed_attempt_count("prop", LOGIN).await.unwrap(),
                    failures
                );
                Ok(())
            })?;
        }
    }
}
