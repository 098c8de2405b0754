//! Brute-force protection and account lockout.
//!
//! Two layers guard the login flow:
//!
//! - [`BruteForceProtection`]: per-identifier failure counters and lockout
//!   flags, keyed by attempt namespace (`login`, `password_reset`). The login
//!   flow tracks the client IP and the submitted username independently.
//! - [`AccountLockout`]: a lock on a resolved user account, written to the
//!   cache and mirrored to the durable user profile.
//!
//! Both live in a [`CacheStore`](crate::cache::CacheStore), so windows and
//! lockouts end when their TTL does.
//!
//! ## Example
//!
//! ```no_run
//! use labitory::cache::MemoryCache;
//! use labitory::security::{BruteForceProtection, SecuritySettings, brute_force::LOGIN};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let protection = BruteForceProtection::new(
//!         Arc::new(MemoryCache::new()),
//!         SecuritySettings::default(),
//!     );
//!
//!     if protection.record_failed_attempt("192.168.1.1", LOGIN).await? {
//!         let remaining = protection
//!             .get_lockout_time_remaining("192.168.1.1", LOGIN)
//!             .await?;
//!         println!("Locked out for {remaining} seconds");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod brute_force;
pub mod config;
pub mod errors;
pub mod lockout;
pub mod report;

pub use brute_force::BruteForceProtection;
pub use config::SecuritySettings;
pub use errors::{SecurityError, SecurityResult};
pub use lockout::{AccountLockout, LockoutInfo};
pub use report::{AccountState, AccountStatus, CacheStatus, SecurityReport, build_report};
