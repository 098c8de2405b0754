//! Integration tests for the login flow.
//!
//! Covers registration, lockout ordering, failure recording, account locking,
//! email login, inactive accounts and TOTP, against in-memory stores.

use labitory::audit::SecurityEventType;
use labitory::auth::errors::LOCKED_MESSAGE;
use labitory::auth::{
    AuthConfig, AuthError, AuthManager, AuthStores, ClientContext, LoginRequest, RegisterRequest,
    User,
};
use labitory::cache::MemoryCache;
use labitory::db::{
    MemorySecurityEventRepository, MemoryTokenRepository, MemoryUserRepository, UserRepository,
};
use labitory::security::{SecuritySettings, brute_force::LOGIN};
use std::{sync::Arc, time::Duration};
use totp_rs::{Algorithm, Secret, TOTP};

const PASSWORD: &str = "Labitory2025";
const TOTP_SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

struct Harness {
    auth: AuthManager,
    users: MemoryUserRepository,
    events: MemorySecurityEventRepository,
}

fn harness_with(security: SecuritySettings) -> Harness {
    let users = MemoryUserRepository::new();
    let events = MemorySecurityEventRepository::new();
    let auth = AuthManager::new(
        AuthStores {
            users: Arc::new(users.clone()),
            tokens: Arc::new(MemoryTokenRepository::new()),
            events: Arc::new(events.clone()),
            cache: Arc::new(MemoryCache::new()),
        },
        AuthConfig {
            pepper: "integration_pepper_16".to_string(),
            jwt_secret: "integration_jwt_secret_of_32_chars!".to_string(),
            security,
            tokens: Default::default(),
        },
    );
    Harness {
        auth,
        users,
        events,
    }
}

fn harness() -> Harness {
    harness_with(SecuritySettings::default())
}

async fn register(auth: &AuthManager, username: &str) -> User {
    auth.register(RegisterRequest {
        username: username.to_string(),
        password: PASSWORD.to_string(),
        email: Some(format!("{username}@lab.test")),
    })
    .await
    .expect("Registration should succeed")
}

fn login(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        totp_code: None,
    }
}

fn client(ip: &str) -> ClientContext {
    ClientContext::new(ip, Some("integration-test".to_string()))
}

fn current_code() -> String {
    let bytes = Secret::Encoded(TOTP_SECRET.to_string()).to_bytes().unwrap();
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes)
        .unwrap()
        .generate_current()
        .unwrap()
}

// === Registration ===

#[tokio::test]
async fn test_register_duplicates_rejected() {
    let h = harness();
    register(&h.auth, "alice").await;

    let dup_name = h
        .auth
        .register(RegisterRequest {
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
            email: None,
        })
        .await;
    assert!(matches!(dup_name, Err(AuthError::UsernameTaken)));

    let dup_email = h
        .auth
        .register(RegisterRequest {
            username: "alice2".to_string(),
            password: PASSWORD.to_string(),
            email: Some("alice@lab.test".to_string()),
        })
        .await;
    assert!(matches!(dup_email, Err(AuthError::EmailTaken)));
}

#[tokio::test]
async fn test_register_validates_input() {
    let h = harness();

    let weak = h
        .auth
        .register(RegisterRequest {
            username: "bob".to_string(),
            password: "password".to_string(),
            email: None,
        })
        .await;
    assert!(matches!(weak, Err(AuthError::WeakPassword(_))));

    let bad_name = h
        .auth
        .register(RegisterRequest {
            username: "b ob".to_string(),
            password: PASSWORD.to_string(),
            email: None,
        })
        .await;
    assert!(matches!(bad_name, Err(AuthError::InvalidUsername(_))));
}

// === Login ===

#[tokio::test]
async fn test_successful_login_issues_tokens() {
    let h = harness();
    let user = register(&h.auth, "alice").await;

    let (logged_in, tokens) = h
        .auth
        .login(&login("alice", PASSWORD), &client("10.0.0.1"))
        .await
        .expect("Login should succeed");

    assert_eq!(logged_in.id, user.id);
    let (verified, _) = h
        .auth
        .tokens()
        .verify_access_token(&tokens.access_token)
        .await
        .unwrap();
    assert_eq!(verified.id, user.id);

    let stored = h.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.last_login.is_some());

    let events = h.events.all().await;
    assert!(events.iter().any(|e| e.event_type == SecurityEventType::LoginAttempt));
    assert!(events.iter().any(|e| e.event_type == SecurityEventType::TokenCreated));
}

#[tokio::test]
async fn test_alice_locked_after_five_failures() {
    let h = harness();
    let alice = register(&h.auth, "alice").await;
    let ip = client("203.0.113.9");

    for i in 0..5 {
        let result = h.auth.authenticate(&login("alice", "WrongPass1"), &ip).await;
        assert!(
            matches!(result, Err(AuthError::InvalidCredentials)),
            "Attempt #{} should fail on credentials",
            i + 1
        );
    }

    // Correct password is now rejected before credentials are checked
    let sixth = h.auth.authenticate(&login("alice", PASSWORD), &ip).await;
    let err = sixth.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
    assert_eq!(err.client_message(), LOCKED_MESSAGE);

    let profile = h.users.get_profile(alice.id).await.unwrap().unwrap();
    assert!(profile.account_locked);
    assert_eq!(
        profile.lock_reason.as_deref(),
        Some("multiple_failed_login_attempts")
    );
    assert_eq!(profile.failed_login_attempts, 5);

    let info = h.auth.lockout().is_user_locked(&alice).await.unwrap().unwrap();
    let minutes = (info.locked_until - info.locked_at.unwrap()).num_minutes();
    assert_eq!(minutes, 30);

    let events = h.events.all().await;
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == SecurityEventType::FailedLogin)
            .count(),
        5
    );
    assert!(events.iter().any(|e| e.event_type == SecurityEventType::AccountLocked));
}

#[tokio::test]
async fn test_account_lock_applies_from_another_ip() {
    let h = harness();
    register(&h.auth, "alice").await;

    for _ in 0..5 {
        let _ = h
            .auth
            .authenticate(&login("alice", "WrongPass1"), &client("198.51.100.1"))
            .await;
    }

    let result = h
        .auth
        .authenticate(&login("alice", PASSWORD), &client("198.51.100.2"))
        .await;
    assert!(matches!(result, Err(AuthError::AccountLocked { .. })));
}

#[tokio::test]
async fn test_success_before_threshold_clears_counters() {
    let h = harness();
    register(&h.auth, "alice").await;
    let ip = client("192.0.2.10");

    for _ in 0..4 {
        let _ = h.auth.authenticate(&login("alice", "WrongPass1"), &ip).await;
    }
    assert_eq!(
        h.auth
            .brute_force()
            .get_failed_attempt_count("alice", LOGIN)
            .await
            .unwrap(),
        4
    );

    h.auth
        .authenticate(&login("alice", PASSWORD), &ip)
        .await
        .expect("Login below the threshold should succeed");

    let bf = h.auth.brute_force();
    assert_eq!(bf.get_failed_attempt_count("alice", LOGIN).await.unwrap(), 0);
    assert_eq!(bf.get_failed_attempt_count("192.0.2.10", LOGIN).await.unwrap(), 0);

    // Four more failures do not reach the threshold again
    for _ in 0..4 {
        let _ = h.auth.authenticate(&login("alice", "WrongPass1"), &ip).await;
    }
    h.auth
        .authenticate(&login("alice", PASSWORD), &ip)
        .await
        .expect("Counters restarted from zero");
}

#[tokio::test]
async fn test_ip_lockout_message_matches_account_lockout() {
    let h = harness();
    register(&h.auth, "alice").await;
    let ip = client("192.0.2.66");

    for i in 0..5 {
        let result = h
            .auth
            .authenticate(&login(&format!("ghost{i}"), "whatever"), &ip)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let err = h
        .auth
        .authenticate(&login("alice", PASSWORD), &ip)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
    assert_eq!(err.client_message(), LOCKED_MESSAGE);

    // Unknown users leave failure events without a user id
    let events = h.events.all().await;
    assert!(
        events
            .iter()
            .filter(|e| e.event_type == SecurityEventType::FailedLogin)
            .all(|e| e.user_id.is_none())
    );
}

#[tokio::test]
async fn test_login_with_email() {
    let h = harness();
    let user = register(&h.auth, "carol").await;

    let logged_in = h
        .auth
        .authenticate(&login("carol@lab.test", PASSWORD), &client("10.1.1.1"))
        .await
        .expect("Email login should succeed");
    assert_eq!(logged_in.id, user.id);
}

#[tokio::test]
async fn test_inactive_user() {
    let h = harness();
    let user = register(&h.auth, "dave").await;
    h.users.set_active(user.id, false).await;

    let correct = h
        .auth
        .authenticate(&login("dave", PASSWORD), &client("10.2.2.2"))
        .await;
    assert!(matches!(correct, Err(AuthError::UserInactive)));

    let wrong = h
        .auth
        .authenticate(&login("dave", "WrongPass1"), &client("10.2.2.2"))
        .await;
    assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_superuser_account_not_locked() {
    let h = harness();
    let root = register(&h.auth, "root").await;
    let mut root_user = root.clone();
    root_user.is_superuser = true;

    for _ in 0..5 {
        h.auth
            .record_login_failure("root", Some(&root_user), &client("10.3.3.3"))
            .await
            .unwrap();
    }

    assert!(h.auth.lockout().is_user_locked(&root).await.unwrap().is_none());
    let profile = h.users.get_profile(root.id).await.unwrap().unwrap();
    assert!(!profile.account_locked);
}

#[tokio::test]
async fn test_rate_limiting_disabled() {
    let h = harness_with(SecuritySettings {
        rate_limit_enabled: false,
        ..SecuritySettings::default()
    });
    register(&h.auth, "erin").await;
    let ip = client("10.4.4.4");

    for _ in 0..10 {
        let result = h.auth.authenticate(&login("erin", "WrongPass1"), &ip).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    h.auth
        .authenticate(&login("erin", PASSWORD), &ip)
        .await
        .expect("No lockout while rate limiting is disabled");
}

#[tokio::test]
async fn test_ip_lockout_ends_with_ttl() {
    let h = harness_with(SecuritySettings {
        max_failed_attempts: 2,
        lockout_duration_secs: 1,
        ..SecuritySettings::default()
    });
    register(&h.auth, "frank").await;
    let ip = client("10.5.5.5");

    for _ in 0..2 {
        let _ = h.auth.authenticate(&login("nobody", "WrongPass1"), &ip).await;
    }
    assert!(matches!(
        h.auth.authenticate(&login("frank", PASSWORD), &ip).await,
        Err(AuthError::AccountLocked { .. })
    ));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    h.auth
        .authenticate(&login("frank", PASSWORD), &ip)
        .await
        .expect("IP lockout should have expired");
}

#[tokio::test]
async fn test_short_lockout_still_locks_account_for_a_minute() {
    let h = harness_with(SecuritySettings {
        max_failed_attempts: 2,
        lockout_duration_secs: 1,
        ..SecuritySettings::default()
    });
    let frank = register(&h.auth, "frank").await;

    for i in 0..2 {
        let _ = h
            .auth
            .authenticate(&login("frank", "WrongPass1"), &client(&format!("10.5.6.{i}")))
            .await;
    }

    let info = h.auth.lockout().is_user_locked(&frank).await.unwrap().unwrap();
    assert_eq!((info.locked_until - info.locked_at.unwrap()).num_minutes(), 1);
}

// === Two-factor ===

#[tokio::test]
async fn test_two_factor_flow() {
    let h = harness();
    let user = register(&h.auth, "grace").await;
    h.auth
        .set_two_factor_secret(user.id, Some(TOTP_SECRET))
        .await
        .unwrap();
    let ip = client("10.6.6.6");

    let missing = h.auth.authenticate(&login("grace", PASSWORD), &ip).await;
    assert!(matches!(missing, Err(AuthError::TwoFactorRequired)));
    assert_eq!(
        h.auth
            .brute_force()
            .get_failed_attempt_count("grace", LOGIN)
            .await
            .unwrap(),
        0
    );

    let mut wrong = login("grace", PASSWORD);
    wrong.totp_code = Some("000000".to_string());
    // A fixed code could collide with the current one; only assert when it does not
    if current_code() != "000000" {
        let result = h.auth.authenticate(&wrong, &ip).await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
        assert_eq!(
            h.auth
                .brute_force()
                .get_failed_attempt_count("grace", LOGIN)
                .await
                .unwrap(),
            1
        );
    }

    let mut right = login("grace", PASSWORD);
    right.totp_code = Some(current_code());
    h.auth
        .authenticate(&right, &ip)
        .await
        .expect("Valid TOTP code should succeed");

    let events = h.events.all().await;
    assert!(events.iter().any(|e| e.event_type == SecurityEventType::TwoFactorEnabled));
}

#[tokio::test]
async fn test_invalid_two_factor_secret_rejected() {
    let h = harness();
    let user = register(&h.auth, "heidi").await;

    let result = h.auth.set_two_factor_secret(user.id, Some("short")).await;
    assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
    assert!(h.users.totp_secret(user.id).await.unwrap().is_none());
}
