//! Error types for security module

use crate::cache::CacheError;
use thiserror::Error;

/// Result type for brute-force and lockout operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Brute-force protection and lockout errors
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Attempt counter store failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Lockout record could not be encoded or decoded
    #[error("Lockout record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
