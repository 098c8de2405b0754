//! Authentication error types.

use crate::db::RepositoryError;
use crate::security::SecurityError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Message shown for every lockout, whichever guard tripped
pub const LOCKED_MESSAGE: &str =
    "Account temporarily locked due to multiple failed login attempts. Please try again later.";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Repository failure
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Cache-backed protection failure
    #[error("Security store error: {0}")]
    Security(#[from] SecurityError),

    /// JWT encoding failed
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Unknown user or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// IP, username or account lockout in force
    #[error("Account locked: {reason}")]
    AccountLocked {
        reason: String,
        until: Option<DateTime<Utc>>,
    },

    /// Too many requests
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Token signature valid but `exp` has passed
    #[error("Token has expired")]
    TokenExpired,

    /// Token jti is on the deny-list
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Token could not be decoded or verified
    #[error("Invalid token")]
    TokenMalformed,

    /// Access token presented where a refresh token is required, or vice versa
    #[error("Invalid token type")]
    InvalidTokenType,

    /// Token metadata not found for this user
    #[error("Token not found or access denied")]
    TokenNotFound,

    /// User disabled
    #[error("User inactive or deleted")]
    UserInactive,

    /// Token refers to a user that no longer exists
    #[error("User not found")]
    UserNotFound,

    /// Username already exists
    #[error("Username already exists")]
    UsernameTaken,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// 2FA required
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    /// Invalid 2FA code
    #[error("Invalid two-factor authentication code")]
    InvalidTwoFactorCode,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Lockouts collapse to one generic message so callers cannot tell whether
    /// the IP, the username or the account tripped. Storage and JWT errors
    /// are sanitized.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::AccountLocked { .. } => LOCKED_MESSAGE.to_string(),
            AuthError::Repository(_) | AuthError::Security(_) | AuthError::HashingFailed => {
                "Internal server error".to_string()
            }
            AuthError::Jwt(_) => "Authentication failed".to_string(),
            AuthError::RateLimited { .. } => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Whether the error is an internal failure rather than a client mistake
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Repository(_)
                | AuthError::Security(_)
                | AuthError::Jwt(_)
                | AuthError::HashingFailed
        )
    }

    pub(crate) fn locked(reason: impl Into<String>, until: Option<DateTime<Utc>>) -> Self {
        AuthError::AccountLocked {
            reason: reason.into(),
            until,
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
