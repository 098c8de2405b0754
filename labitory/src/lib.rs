//! # Labitory
//!
//! Authentication abuse protection and token lifecycle for the Labitory
//! laboratory booking system.
//!
//! ## Core Modules
//!
//! - [`cache`]: TTL key-value store (in-process or Redis) holding attempt counters and lockouts
//! - [`security`]: brute-force protection, account lockout and the security status report
//! - [`auth`]: login flow, registration, JWT issuance, rotation and revocation
//! - [`audit`]: append-only security event log
//! - [`db`]: PostgreSQL pool, repositories and their in-memory counterparts
//!
//! ## Login flow
//!
//! ```text
//! UNCHECKED ──► IP locked?  ──yes──► rejected (locked)
//!           ──► username locked? ──yes──► rejected (locked)
//!           ──► account locked?  ──yes──► rejected (locked)
//!           ──► credentials ──bad──► failure recorded ──► maybe account locked
//!                            ──ok───► counters cleared ──► tokens issued
//! ```

pub mod audit;
pub mod auth;
pub mod cache;
pub mod db;
pub mod security;

pub use auth::{AuthConfig, AuthError, AuthManager, AuthResult, AuthStores};
pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use security::{AccountLockout, BruteForceProtection, SecuritySettings};
