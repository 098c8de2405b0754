//! Maintenance operations behind each command.
//!
//! Everything here works against an [`AuthManager`], so the same code runs
//! over PostgreSQL in production and over the in-memory stores in tests.

use anyhow::{Context, Result, anyhow};
use labitory::{
    AuthManager, CacheStore,
    auth::{TokenService, TokenStats},
    security::{SecurityReport, build_report},
};

/// Result of an unlock request for an existing user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// No lock was in place; nothing changed
    NotLocked,
    Unlocked { cleared_attempts: bool },
}

/// Unlock `username`.
///
/// Unlocking always clears the cache counters for the username and email.
/// `clear_attempts` also resets the durable failure counter on the profile.
///
/// # Errors
///
/// Fails if the user does not exist or a store cannot be reached.
pub async fn unlock(
    auth: &AuthManager,
    username: &str,
    clear_attempts: bool,
) -> Result<UnlockOutcome> {
    let user = auth
        .users()
        .find_by_username(username)
        .await
        .context("Failed to look up user")?
        .ok_or_else(|| anyhow!("User \"{}\" does not exist.", username))?;

    if auth.lockout().is_user_locked(&user).await?.is_none() {
        return Ok(UnlockOutcome::NotLocked);
    }

    auth.lockout().unlock_user_account(&user).await?;

    if clear_attempts {
        auth.users()
            .reset_failed_logins(user.id)
            .await
            .context("Failed to reset failed login counter")?;
    }

    Ok(UnlockOutcome::Unlocked {
        cleared_attempts: clear_attempts,
    })
}

/// Build the security status report over the cache holding the counters.
pub async fn status(auth: &AuthManager, cache: &dyn CacheStore) -> Result<SecurityReport> {
    let report = build_report(
        auth.users().as_ref(),
        auth.lockout(),
        auth.brute_force(),
        cache,
    )
    .await?;
    Ok(report)
}

/// What a token cleanup did, or would do on a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub dry_run: bool,
    pub expired: u64,
    /// Revoked tokens past the age cutoff; `None` when no cutoff was given
    pub revoked: Option<u64>,
    /// Counts after the cleanup
    pub stats: TokenStats,
}

/// Delete expired tokens and, when `days` is positive, tokens revoked more
/// than `days` ago. A dry run only counts.
pub async fn cleanup_tokens(
    tokens: &TokenService,
    days: Option<i64>,
    dry_run: bool,
) -> Result<CleanupSummary> {
    let expired = if dry_run {
        tokens.expired_count().await?
    } else {
        tokens.cleanup_expired().await?
    };

    let revoked = match days.filter(|days| *days > 0) {
        Some(days) if dry_run => Some(tokens.revoked_older_than_count(days).await?),
        Some(days) => Some(tokens.cleanup_revoked_older_than(days).await?),
        None => None,
    };

    Ok(CleanupSummary {
        dry_run,
        expired,
        revoked,
        stats: tokens.stats().await?,
    })
}
