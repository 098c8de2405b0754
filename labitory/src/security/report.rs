//! Security status snapshot for operators.

use super::{
    brute_force::{BruteForceProtection, LOGIN},
    config::SecuritySettings,
    errors::SecurityError,
    lockout::AccountLockout,
};
use crate::cache::{self, CacheStore};
use crate::db::repository::{RepositoryError, UserRepository};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors while building a report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Security store error: {0}")]
    Security(#[from] SecurityError),
}

/// Lockout state of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Locked {
        reason: String,
        until: DateTime<Utc>,
    },
    /// Not locked, but the login counter is non-zero
    Warning { failed_attempts: u32 },
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    pub username: String,
    pub email: Option<String>,
    pub state: AccountState,
}

/// Result of writing and reading back a probe key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Working,
    NotWorking,
    Error(String),
}

/// Account with a non-zero durable failure counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLoginSummary {
    pub username: String,
    pub failed_login_attempts: i32,
    pub last_failed_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SecurityReport {
    pub settings: SecuritySettings,
    pub cache_backend: &'static str,
    pub cache_status: CacheStatus,
    /// Every account, ordered by username
    pub accounts: Vec<AccountStatus>,
    pub locked_count: usize,
    pub total_count: usize,
    pub users_with_failures: Vec<FailedLoginSummary>,
}

impl SecurityReport {
    pub fn locked_accounts(&self) -> impl Iterator<Item = &AccountStatus> {
        self.accounts
            .iter()
            .filter(|a| matches!(a.state, AccountState::Locked { .. }))
    }
}

/// Collect settings, per-account lockout state and cache health
///
/// # Errors
///
/// Returns an error if users cannot be listed or the cache cannot be read.
/// A failing cache probe is reported in [`SecurityReport::cache_status`]
/// rather than as an error.
pub async fn build_report(
    users: &dyn UserRepository,
    lockout: &AccountLockout,
    brute_force: &BruteForceProtection,
    cache: &dyn CacheStore,
) -> Result<SecurityReport, ReportError> {
    let accounts = users.list_accounts().await?;

    let mut statuses = Vec::with_capacity(accounts.len());
    let mut users_with_failures = Vec::new();

    for (user, profile) in &accounts {
        let state = match lockout.is_user_locked(user).await? {
            Some(info) => AccountState::Locked {
                reason: info.reason,
                until: info.locked_until,
            },
            None => match brute_force.get_failed_attempt_count(&user.username, LOGIN).await? {
                0 => AccountState::Ok,
                failed_attempts => AccountState::Warning { failed_attempts },
            },
        };

        statuses.push(AccountStatus {
            username: user.username.clone(),
            email: user.email.clone(),
            state,
        });

        if let Some(profile) = profile
            && profile.failed_login_attempts > 0
        {
            users_with_failures.push(FailedLoginSummary {
                username: user.username.clone(),
                failed_login_attempts: profile.failed_login_attempts,
                last_failed_login: profile.last_failed_login,
            });
        }
    }

    let cache_status = match cache::probe(cache).await {
        Ok(true) => CacheStatus::Working,
        Ok(false) => CacheStatus::NotWorking,
        Err(e) => CacheStatus::Error(e.to_string()),
    };

    let locked_count = statuses
        .iter()
        .filter(|s| matches!(s.state, AccountState::Locked { .. }))
        .count();

    Ok(SecurityReport {
        settings: brute_force.settings().clone(),
        cache_backend: cache.backend_name(),
        cache_status,
        total_count: statuses.len(),
        locked_count,
        accounts: statuses,
        users_with_failures,
    })
}
