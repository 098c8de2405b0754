//! Authentication: login flow, registration and token lifecycle.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - Lockout-aware login (IP, username and account checks before credentials)
//! - Optional TOTP second factor
//! - JWT access tokens (15-minute expiry) and single-use refresh tokens (7-day expiry)
//! - Server-side revocation through a jti deny-list
//!
//! ## Example
//!
//! ```no_run
//! use labitory::auth::{AuthConfig, AuthManager, AuthStores, ClientContext, LoginRequest};
//! use labitory::cache::MemoryCache;
//! use labitory::db::{
//!     MemorySecurityEventRepository, MemoryTokenRepository, MemoryUserRepository,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthManager::new(
//!         AuthStores {
//!             users: Arc::new(MemoryUserRepository::new()),
//!             tokens: Arc::new(MemoryTokenRepository::new()),
//!             events: Arc::new(MemorySecurityEventRepository::new()),
//!             cache: Arc::new(MemoryCache::new()),
//!         },
//!         AuthConfig {
//!             pepper: "secret_pepper_value".to_string(),
//!             jwt_secret: "jwt_secret_at_least_32_characters_long".to_string(),
//!             security: Default::default(),
//!             tokens: Default::default(),
//!         },
//!     );
//!
//!     let request = LoginRequest {
//!         username: "alice".to_string(),
//!         password: "SecurePass123".to_string(),
//!         totp_code: None,
//!     };
//!     let client = ClientContext::new("192.168.1.1", None);
//!
//!     let (user, tokens) = auth.login(&request, &client).await?;
//!     println!("{} logged in, access token expires {}", user.username, tokens.access_token_expires);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod tokens;

pub use errors::{AuthError, AuthResult};
pub use manager::{AuthConfig, AuthManager, AuthStores};
pub use models::{
    ApiToken, Claims, ClientContext, LoginRequest, RegisterRequest, TokenPair, TokenStats,
    TokenType, User, UserId, UserProfile,
};
pub use tokens::{TokenService, TokenSettings};
