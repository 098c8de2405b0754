//! Brute-force and lockout settings.

use crate::db::config::parse_env_or;
use std::time::Duration;

/// Thresholds and durations for failed-attempt tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    /// Master switch; when false nothing is counted and nothing is locked out
    pub rate_limit_enabled: bool,
    /// Failures within the window that trigger a lockout
    pub max_failed_attempts: u32,
    /// How long a lockout lasts, in seconds
    pub lockout_duration_secs: u64,
    /// Lifetime of a failure counter, refreshed on every failure
    pub attempt_window_secs: u64,
    /// Whether the login flow records failures at all
    pub track_failed_attempts: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            max_failed_attempts: 5,
            lockout_duration_secs: 1800,
            attempt_window_secs: 900,
            track_failed_attempts: true,
        }
    }
}

impl SecuritySettings {
    /// Load settings from the environment
    ///
    /// - `RATELIMIT_ENABLE` (default: true)
    /// - `AUTH_MAX_FAILED_ATTEMPTS` (default: 5)
    /// - `AUTH_LOCKOUT_DURATION` seconds (default: 1800)
    /// - `AUTH_ATTEMPT_WINDOW` seconds (default: 900)
    /// - `AUTH_TRACK_FAILED_ATTEMPTS` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rate_limit_enabled: parse_env_or("RATELIMIT_ENABLE", defaults.rate_limit_enabled),
            max_failed_attempts: parse_env_or(
                "AUTH_MAX_FAILED_ATTEMPTS",
                defaults.max_failed_attempts,
            ),
            lockout_duration_secs: parse_env_or(
                "AUTH_LOCKOUT_DURATION",
                defaults.lockout_duration_secs,
            ),
            attempt_window_secs: parse_env_or("AUTH_ATTEMPT_WINDOW", defaults.attempt_window_secs),
            track_failed_attempts: parse_env_or(
                "AUTH_TRACK_FAILED_ATTEMPTS",
                defaults.track_failed_attempts,
            ),
        }
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }

    pub fn attempt_window(&self) -> Duration {
        Duration::from_secs(self.attempt_window_secs)
    }

    /// Account lock length handed to the account lockout, in whole minutes,
    /// never below one
    pub fn lockout_minutes(&self) -> u64 {
        (self.lockout_duration_secs / 60).max(1)
    }
}
