//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use labitory::auth::TokenSettings;
use labitory::db::{DatabaseConfig, config::parse_env_or};
use labitory::security::SecuritySettings;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Shared cache; the in-process cache is used when unset
    pub redis_url: Option<String>,
    /// Prometheus scrape address; metrics are not exported when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Secrets
    pub security: SecurityConfig,
    /// Brute-force thresholds and lockout durations
    pub auth: SecuritySettings,
    /// Access and refresh token lifetimes
    pub tokens: TokenSettings,
    /// Per-IP request limiter on the authentication routes
    pub rate_limit: RateLimitConfig,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
}

/// Sliding-window limits for the authentication routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per client IP within one window
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_addr("SERVER_BIND")?.unwrap_or_else(default_bind),
        };

        let mut database = DatabaseConfig::from_env().unwrap_or_default();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let metrics_bind = parse_addr("METRICS_BIND")?;

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let auth = SecuritySettings::from_env();
        let rate_limit = RateLimitConfig {
            enabled: auth.rate_limit_enabled,
            max_requests: parse_env_or("RATELIMIT_SENSITIVE_REQUESTS", 10),
            window_secs: parse_env_or("RATELIMIT_SENSITIVE_WINDOW_SECS", 60),
        };

        Ok(ServerConfig {
            bind,
            database,
            redis_url,
            metrics_bind,
            security: SecurityConfig {
                jwt_secret,
                password_pepper,
            },
            auth,
            tokens: TokenSettings::from_env(),
            rate_limit,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(invalid(
                "JWT_SECRET",
                "Must be at least 32 characters (128-bit security)",
            ));
        }

        if self.security.password_pepper.len() < 16 {
            return Err(invalid(
                "PASSWORD_PEPPER",
                "Must be at least 16 characters (64-bit security)",
            ));
        }

        if self.auth.max_failed_attempts == 0 {
            return Err(invalid("AUTH_MAX_FAILED_ATTEMPTS", "Must be greater than 0"));
        }

        if self.auth.lockout_duration_secs == 0 {
            return Err(invalid("AUTH_LOCKOUT_DURATION", "Must be greater than 0"));
        }

        if self.auth.attempt_window_secs == 0 {
            return Err(invalid("AUTH_ATTEMPT_WINDOW", "Must be greater than 0"));
        }

        if self.tokens.access_token_lifetime <= chrono::Duration::zero() {
            return Err(invalid("JWT_ACCESS_TOKEN_LIFETIME", "Must be greater than 0"));
        }

        if self.tokens.refresh_token_lifetime <= self.tokens.access_token_lifetime {
            return Err(invalid(
                "JWT_REFRESH_TOKEN_LIFETIME",
                "Must outlive the access token",
            ));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(invalid("RATELIMIT_SENSITIVE_REQUESTS", "Must be greater than 0"));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(invalid("RATELIMIT_SENSITIVE_WINDOW_SECS", "Must be greater than 0"));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Read an optional socket address; set but unparseable is an error
fn parse_addr(var: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, "Expected IP:PORT")),
        _ => Ok(None),
    }
}

fn default_bind() -> SocketAddr {
    DEFAULT_BIND
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8000)))
}
