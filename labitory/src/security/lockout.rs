//! Per-account lockout with a durable mirror on the user profile.
//!
//! The cache entry `user_lockout:{user_id}` is authoritative while it lives.
//! The profile mirror survives cache flushes; once its `locked_until` has
//! passed it is cleared on the next read. Profile reads and writes are
//! best-effort: when they fail, enforcement continues from the cache alone.

use super::{
    brute_force::{BruteForceProtection, LOGIN},
    errors::SecurityResult,
};
use crate::auth::models::{User, UserId};
use crate::cache::CacheStore;
use crate::db::repository::{RepositoryResult, UserRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Lock length used when none is given
pub const DEFAULT_LOCK_MINUTES: u64 = 30;

/// Reason recorded when the durable mirror has none
pub const DEFAULT_LOCK_REASON: &str = "Account locked";

fn user_lockout_key(user_id: UserId) -> String {
    format!("user_lockout:{user_id}")
}

/// Active account lock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockoutInfo {
    /// Absent when the lock was recovered from the profile mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_until: DateTime<Utc>,
    pub reason: String,
}

/// Locks and unlocks individual user accounts
#[derive(Clone)]
pub struct AccountLockout {
    cache: Arc<dyn CacheStore>,
    users: Arc<dyn UserRepository>,
    brute_force: BruteForceProtection,
}

impl AccountLockout {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        users: Arc<dyn UserRepository>,
        brute_force: BruteForceProtection,
    ) -> Self {
        Self {
            cache,
            users,
            brute_force,
        }
    }

    /// Lock a user account
    ///
    /// Superuser accounts are never locked.
    ///
    /// # Arguments
    ///
    /// * `user` - Account to lock
    /// * `reason` - Stored with the lock and shown to operators
    /// * `duration_minutes` - Lock length
    ///
    /// # Returns
    ///
    /// * `false` for superusers, `true` once the cache entry is written
    ///
    /// # Errors
    ///
    /// Returns an error if the cache write fails. A failed profile write is
    /// logged and does not fail the lock.
    pub async fn lock_user_account(
        &self,
        user: &User,
        reason: &str,
        duration_minutes: u64,
    ) -> SecurityResult<bool> {
        if user.is_superuser {
            log::warn!("Refusing to lock superuser account: {}", user.username);
            return Ok(false);
        }

        let now = Utc::now();
        let info = LockoutInfo {
            locked_at: Some(now),
            locked_until: now + chrono::Duration::minutes(duration_minutes as i64),
            reason: reason.to_string(),
        };

        self.cache
            .set(
                &user_lockout_key(user.id),
                &serde_json::to_string(&info)?,
                Duration::from_secs(duration_minutes * 60),
            )
            .await?;

        if let Err(e) = self.mirror_lock(user.id, &info).await {
            log::warn!(
                "Could not mirror lockout for {} to profile, enforcing from cache only: {}",
                user.username,
                e
            );
        }

        log::warn!(
            "User account locked: {} for {} minutes. Reason: {}",
            user.username,
            duration_minutes,
            reason
        );
        Ok(true)
    }

    /// Current lock on a user account, if any
    ///
    /// Checks the cache first, then the profile mirror. An expired mirror is
    /// cleared and reported as unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache read fails or holds an unreadable record.
    pub async fn is_user_locked(&self, user: &User) -> SecurityResult<Option<LockoutInfo>> {
        if let Some(raw) = self.cache.get(&user_lockout_key(user.id)).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        let profile = match self.users.get_profile(user.id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Ok(None),
            Err(e) => {
                log::warn!("Could not read lockout profile for {}: {}", user.username, e);
                return Ok(None);
            }
        };

        let Some(locked_until) = profile.locked_until.filter(|_| profile.account_locked) else {
            return Ok(None);
        };

        if Utc::now() < locked_until {
            return Ok(Some(LockoutInfo {
                locked_at: None,
                locked_until,
                reason: profile
                    .lock_reason
                    .unwrap_or_else(|| DEFAULT_LOCK_REASON.to_string()),
            }));
        }

        if let Err(e) = self.users.clear_profile_lock(user.id).await {
            log::warn!("Could not clear expired lockout for {}: {}", user.username, e);
        } else {
            log::info!("Expired lockout cleared for {}", user.username);
        }
        Ok(None)
    }

    /// Unlock a user account
    ///
    /// Removes the cache entry, clears the profile mirror and clears the
    /// login failure counters for the username and, if set, the email.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be updated.
    pub async fn unlock_user_account(&self, user: &User) -> SecurityResult<bool> {
        self.cache.delete(&user_lockout_key(user.id)).await?;

        if let Err(e) = self.users.clear_profile_lock(user.id).await {
            log::warn!("Could not clear profile lockout for {}: {}", user.username, e);
        }

        self.brute_force
            .clear_failed_attempts(&user.username, LOGIN)
            .await?;
        if let Some(email) = &user.email {
            self.brute_force.clear_failed_attempts(email, LOGIN).await?;
        }

        log::info!("User account unlocked: {}", user.username);
        Ok(true)
    }

    async fn mirror_lock(&self, user_id: UserId, info: &LockoutInfo) -> RepositoryResult<()> {
        self.users
            .set_profile_lock(user_id, info.locked_until, &info.reason)
            .await
    }
}
