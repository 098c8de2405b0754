//! Integration tests for security features.
//!
//! Brute-force counters, account lockout and the security report through the
//! public API. The Redis test needs a running server and is ignored by
//! default.

use labitory::auth::models::NewUser;
use labitory::auth::User;
use labitory::cache::{CacheStore, MemoryCache, RedisCache};
use labitory::db::{MemoryUserRepository, UserRepository};
use labitory::security::{
    AccountLockout, AccountState, BruteForceProtection, CacheStatus, SecuritySettings,
    brute_force::{LOGIN, PASSWORD_RESET},
    build_report,
};
use std::sync::Arc;

struct Harness {
    cache: Arc<dyn CacheStore>,
    users: MemoryUserRepository,
    brute_force: BruteForceProtection,
    lockout: AccountLockout,
}

fn setup(cache: Arc<dyn CacheStore>, settings: SecuritySettings) -> Harness {
    let users = MemoryUserRepository::new();
    let brute_force = BruteForceProtection::new(cache.clone(), settings);
    let lockout = AccountLockout::new(cache.clone(), Arc::new(users.clone()), brute_force.clone());
    Harness {
        cache,
        users,
        brute_force,
        lockout,
    }
}

fn setup_memory() -> Harness {
    setup(Arc::new(MemoryCache::new()), SecuritySettings::default())
}

async fn create_user(users: &MemoryUserRepository, username: &str, email: Option<&str>) -> User {
    users
        .create_user(&NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash: "unused".to_string(),
            is_active: true,
            is_superuser: false,
        })
        .await
        .expect("Failed to create user")
}

#[tokio::test]
async fn test_threshold_locks_identifier() {
    let h = setup_memory();

    for i in 1..5 {
        let locked = h.brute_force.record_failed_attempt("10.9.9.9", LOGIN).await.unwrap();
        assert!(!locked, "Attempt #{i} should stay below the threshold");
    }
    assert!(!h.brute_force.is_locked_out("10.9.9.9", LOGIN).await.unwrap());

    assert!(h.brute_force.record_failed_attempt("10.9.9.9", LOGIN).await.unwrap());
    assert!(h.brute_force.is_locked_out("10.9.9.9", LOGIN).await.unwrap());

    let remaining = h
        .brute_force
        .get_lockout_time_remaining("10.9.9.9", LOGIN)
        .await
        .unwrap();
    assert!(remaining > 0 && remaining <= 1800);

    h.brute_force.clear_failed_attempts("10.9.9.9", LOGIN).await.unwrap();
    assert!(!h.brute_force.is_locked_out("10.9.9.9", LOGIN).await.unwrap());
    assert_eq!(
        h.brute_force
            .get_lockout_time_remaining("10.9.9.9", LOGIN)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_attempt_types_are_separate() {
    let h = setup_memory();

    for _ in 0..5 {
        h.brute_force
            .record_failed_attempt("alice", PASSWORD_RESET)
            .await
            .unwrap();
    }

    assert!(h.brute_force.is_locked_out("alice", PASSWORD_RESET).await.unwrap());
    assert!(!h.brute_force.is_locked_out("alice", LOGIN).await.unwrap());
    assert_eq!(
        h.brute_force.get_failed_attempt_count("alice", LOGIN).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_corrupt_counter_is_an_error() {
    let h = setup_memory();
    h.cache
        .set(
            "auth_attempts:login:mallory",
            "lots",
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap();

    assert!(
        h.brute_force
            .get_failed_attempt_count("mallory", LOGIN)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_lock_survives_cache_flush() {
    let users = MemoryUserRepository::new();
    let first_cache = Arc::new(MemoryCache::new());
    let bf = BruteForceProtection::new(first_cache.clone(), SecuritySettings::default());
    let lockout = AccountLockout::new(first_cache, Arc::new(users.clone()), bf);

    let user = create_user(&users, "alice", None).await;
    assert!(lockout.lock_user_account(&user, "manual", 30).await.unwrap());

    // A fresh cache only has the profile mirror to go on
    let fresh_cache = Arc::new(MemoryCache::new());
    let bf = BruteForceProtection::new(fresh_cache.clone(), SecuritySettings::default());
    let after_flush = AccountLockout::new(fresh_cache, Arc::new(users.clone()), bf);

    let info = after_flush.is_user_locked(&user).await.unwrap().unwrap();
    assert_eq!(info.reason, "manual");
    assert!(info.locked_at.is_none());
}

#[tokio::test]
async fn test_unlock_clears_counters_for_username_and_email() {
    let h = setup_memory();
    let user = create_user(&h.users, "bob", Some("bob@lab.test")).await;

    for _ in 0..3 {
        h.brute_force.record_failed_attempt("bob", LOGIN).await.unwrap();
        h.brute_force
            .record_failed_attempt("bob@lab.test", LOGIN)
            .await
            .unwrap();
    }
    h.lockout.lock_user_account(&user, "manual", 30).await.unwrap();

    assert!(h.lockout.unlock_user_account(&user).await.unwrap());

    assert!(h.lockout.is_user_locked(&user).await.unwrap().is_none());
    assert_eq!(
        h.brute_force.get_failed_attempt_count("bob", LOGIN).await.unwrap(),
        0
    );
    assert_eq!(
        h.brute_force
            .get_failed_attempt_count("bob@lab.test", LOGIN)
            .await
            .unwrap(),
        0
    );
    let profile = h.users.get_profile(user.id).await.unwrap().unwrap();
    assert!(!profile.account_locked);
    assert!(profile.locked_until.is_none());
}

#[tokio::test]
async fn test_lock_without_profile_still_enforced() {
    let h = setup_memory();
    let user = create_user(&h.users, "carol", None).await;
    h.users.remove_profile(user.id).await;

    assert!(h.lockout.lock_user_account(&user, "manual", 5).await.unwrap());
    assert!(h.lockout.is_user_locked(&user).await.unwrap().is_some());
}

#[tokio::test]
async fn test_report_counts_locked_accounts() {
    let h = setup_memory();
    let alice = create_user(&h.users, "alice", None).await;
    create_user(&h.users, "bob", None).await;
    h.lockout.lock_user_account(&alice, "manual", 30).await.unwrap();

    let report = build_report(&h.users, &h.lockout, &h.brute_force, h.cache.as_ref())
        .await
        .unwrap();

    assert_eq!(report.total_count, 2);
    assert_eq!(report.locked_count, 1);
    assert_eq!(report.cache_status, CacheStatus::Working);
    let locked: Vec<_> = report.locked_accounts().map(|a| a.username.as_str()).collect();
    assert_eq!(locked, ["alice"]);
    assert!(matches!(
        &report.accounts[0].state,
        AccountState::Locked { reason, .. } if reason == "manual"
    ));
}

#[tokio::test]
#[ignore = "Requires a running Redis server"]
async fn test_redis_backend_lockout() {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let cache = RedisCache::connect(&redis_url)
        .await
        .expect("Failed to connect to Redis");
    let h = setup(Arc::new(cache), SecuritySettings::default());

    let identifier = format!("redis-it-{}", std::process::id());
    h.brute_force.clear_failed_attempts(&identifier, LOGIN).await.unwrap();

    for _ in 0..5 {
        h.brute_force
            .record_failed_attempt(&identifier, LOGIN)
            .await
            .unwrap();
    }
    assert!(h.brute_force.is_locked_out(&identifier, LOGIN).await.unwrap());
    let remaining = h
        .brute_force
        .get_lockout_time_remaining(&identifier, LOGIN)
        .await
        .unwrap();
    assert!(remaining > 1700 && remaining <= 1800);

    h.brute_force.clear_failed_attempts(&identifier, LOGIN).await.unwrap();
    assert_eq!(h.cache.backend_name(), "redis");
}
