//! Integration tests for the token lifecycle.
//!
//! Issuance, verification, single-use refresh rotation, revocation and
//! cleanup, against in-memory stores.

use chrono::Duration;
use labitory::audit::{AuditLog, SecurityEventType};
use labitory::auth::models::NewUser;
use labitory::auth::{AuthError, ClientContext, TokenService, TokenSettings, TokenType, User};
use labitory::db::{
    MemorySecurityEventRepository, MemoryTokenRepository, MemoryUserRepository, TokenRepository,
    UserRepository,
};
use std::sync::Arc;

const SECRET: &str = "token_integration_secret_32_chars!!";

struct Harness {
    service: TokenService,
    users: MemoryUserRepository,
    tokens: MemoryTokenRepository,
    events: MemorySecurityEventRepository,
}

fn harness_with(settings: TokenSettings) -> Harness {
    let users = MemoryUserRepository::new();
    let tokens = MemoryTokenRepository::new();
    let events = MemorySecurityEventRepository::new();
    let service = TokenService::new(
        SECRET,
        settings,
        Arc::new(users.clone()),
        Arc::new(tokens.clone()),
        AuditLog::new(Arc::new(events.clone())),
    );
    Harness {
        service,
        users,
        tokens,
        events,
    }
}

fn harness() -> Harness {
    harness_with(TokenSettings::default())
}

async fn create_user(users: &MemoryUserRepository, username: &str) -> User {
    users
        .create_user(&NewUser {
            username: username.to_string(),
            email: None,
            password_hash: "unused".to_string(),
            is_active: true,
            is_superuser: false,
        })
        .await
        .expect("Failed to create user")
}

#[tokio::test]
async fn test_issued_pair_is_recorded() {
    let h = harness();
    let user = create_user(&h.users, "alice").await;
    let client = ClientContext::new("10.0.0.7", Some("curl/8.0".to_string()));

    let pair = h.service.generate_tokens(&user, Some(&client)).await.unwrap();

    assert_ne!(pair.access_jti, pair.refresh_jti);
    assert!(pair.access_token_expires < pair.refresh_token_expires);

    let access = h.tokens.find(pair.access_jti).await.unwrap().unwrap();
    assert_eq!(access.token_type, TokenType::Access);
    assert_eq!(access.ip_address.as_deref(), Some("10.0.0.7"));
    assert_eq!(access.user_agent.as_deref(), Some("curl/8.0"));

    let refresh_claims = h.service.decode(&pair.refresh_token).unwrap();
    assert_eq!(refresh_claims.token_type, TokenType::Refresh);
    assert!(refresh_claims.username.is_none());

    let (owner, claims) = h.service.verify_access_token(&pair.access_token).await.unwrap();
    assert_eq!(owner.id, user.id);
    assert_eq!(claims.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_refresh_rotation_is_single_use() {
    let h = harness();
    let user = create_user(&h.users, "alice").await;
    let first = h.service.generate_tokens(&user, None).await.unwrap();

    let (owner, second) = h.service.refresh(&first.refresh_token).await.unwrap();
    assert_eq!(owner.username, "alice");
    assert_ne!(second.refresh_jti, first.refresh_jti);

    let replay = h.service.refresh(&first.refresh_token).await;
    assert!(matches!(replay, Err(AuthError::TokenRevoked)));

    // The newly issued refresh token still works
    h.service.refresh(&second.refresh_token).await.unwrap();

    // Rotation leaves the old access token alone
    h.service.verify_access_token(&first.access_token).await.unwrap();
}

#[tokio::test]
async fn test_token_types_not_interchangeable() {
    let h = harness();
    let user = create_user(&h.users, "alice").await;
    let pair = h.service.generate_tokens(&user, None).await.unwrap();

    assert!(matches!(
        h.service.refresh(&pair.access_token).await,
        Err(AuthError::InvalidTokenType)
    ));
    assert!(matches!(
        h.service.verify_access_token(&pair.refresh_token).await,
        Err(AuthError::InvalidTokenType)
    ));
}

#[tokio::test]
async fn test_revoke_all_and_list_active() {
    let h = harness();
    let alice = create_user(&h.users, "alice").await;
    let bob = create_user(&h.users, "bob").await;

    let first = h.service.generate_tokens(&alice, None).await.unwrap();
    h.service.generate_tokens(&alice, None).await.unwrap();
    let bobs = h.service.generate_tokens(&bob, None).await.unwrap();

    assert_eq!(h.service.list_active(alice.id).await.unwrap().len(), 4);

    h.service.revoke_owned(&alice, first.access_jti, None).await.unwrap();
    let active = h.service.list_active(alice.id).await.unwrap();
    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|t| t.jti != first.access_jti));
    assert!(matches!(
        h.service.verify_access_token(&first.access_token).await,
        Err(AuthError::TokenRevoked)
    ));

    // Someone else's token looks like a missing one
    assert!(matches!(
        h.service.revoke_owned(&alice, bobs.access_jti, None).await,
        Err(AuthError::TokenNotFound)
    ));

    let revoked = h.service.revoke_all(&alice, None).await.unwrap();
    assert_eq!(revoked, 3);
    assert!(h.service.list_active(alice.id).await.unwrap().is_empty());
    assert_eq!(h.service.list_active(bob.id).await.unwrap().len(), 2);

    let events = h.events.all().await;
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == SecurityEventType::TokenRevoked)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_disabled_user_tokens_rejected() {
    let h = harness();
    let user = create_user(&h.users, "carol").await;
    let pair = h.service.generate_tokens(&user, None).await.unwrap();

    h.users.set_active(user.id, false).await;
    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::UserInactive)
    ));
    assert!(matches!(
        h.service.refresh(&pair.refresh_token).await,
        Err(AuthError::UserInactive)
    ));

    h.users.delete_user(user.id).await;
    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::UserNotFound)
    ));
}

#[tokio::test]
async fn test_expired_tokens_rejected_and_cleaned_up() {
    let h = harness_with(TokenSettings {
        access_token_lifetime: Duration::seconds(-60),
        refresh_token_lifetime: Duration::days(7),
    });
    let user = create_user(&h.users, "dave").await;
    let pair = h.service.generate_tokens(&user, None).await.unwrap();

    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::TokenExpired)
    ));

    assert_eq!(h.service.expired_count().await.unwrap(), 1);
    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);

    assert_eq!(h.service.cleanup_expired().await.unwrap(), 1);
    assert_eq!(h.tokens.len().await, 1);
    assert_eq!(h.service.expired_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_revoked_respects_age() {
    let h = harness();
    let user = create_user(&h.users, "erin").await;
    h.service.generate_tokens(&user, None).await.unwrap();
    h.service.revoke_all(&user, None).await.unwrap();

    assert_eq!(h.service.revoked_older_than_count(30).await.unwrap(), 0);
    assert_eq!(h.service.cleanup_revoked_older_than(30).await.unwrap(), 0);
    assert_eq!(h.tokens.len().await, 2);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(h.service.revoked_older_than_count(0).await.unwrap(), 2);
    assert_eq!(h.service.cleanup_revoked_older_than(0).await.unwrap(), 2);
    assert!(h.tokens.is_empty().await);
}

#[tokio::test]
async fn test_revoked_token_stays_rejected_after_cleanup() {
    let h = harness_with(TokenSettings {
        access_token_lifetime: Duration::days(30),
        refresh_token_lifetime: Duration::days(60),
    });
    let user = create_user(&h.users, "erin").await;
    let pair = h.service.generate_tokens(&user, None).await.unwrap();
    assert!(h.service.revoke(pair.access_jti).await.unwrap());
    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::TokenRevoked)
    ));

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(h.service.cleanup_revoked_older_than(0).await.unwrap(), 1);
    assert!(h.tokens.find(pair.access_jti).await.unwrap().is_none());

    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_unrecorded_token_rejected() {
    let h = harness();
    let user = create_user(&h.users, "ivan").await;
    let untracked = TokenService::new(
        SECRET,
        TokenSettings::default(),
        Arc::new(h.users.clone()),
        Arc::new(MemoryTokenRepository::new()),
        AuditLog::new(Arc::new(MemorySecurityEventRepository::new())),
    );
    let pair = untracked.generate_tokens(&user, None).await.unwrap();

    assert!(matches!(
        h.service.verify_access_token(&pair.access_token).await,
        Err(AuthError::TokenRevoked)
    ));
    assert!(matches!(
        h.service.refresh(&pair.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_record_usage_updates_metadata() {
    let h = harness();
    let user = create_user(&h.users, "frank").await;
    let pair = h.service.generate_tokens(&user, None).await.unwrap();

    let client = ClientContext::new("172.16.0.4", Some("lab-kiosk".to_string()));
    h.service.record_usage(pair.access_jti, &client).await.unwrap();

    let row = h.tokens.find(pair.access_jti).await.unwrap().unwrap();
    assert!(row.last_used_at.is_some());
    assert_eq!(row.ip_address.as_deref(), Some("172.16.0.4"));
    assert_eq!(row.user_agent.as_deref(), Some("lab-kiosk"));
}

#[tokio::test]
async fn test_foreign_signature_rejected() {
    let h = harness();
    let user = create_user(&h.users, "grace").await;
    let forger = TokenService::new(
        "a_completely_different_secret_value",
        TokenSettings::default(),
        Arc::new(h.users.clone()),
        Arc::new(MemoryTokenRepository::new()),
        AuditLog::new(Arc::new(MemorySecurityEventRepository::new())),
    );
    let forged = forger.generate_tokens(&user, None).await.unwrap();

    assert!(matches!(
        h.service.verify_access_token(&forged.access_token).await,
        Err(AuthError::TokenMalformed)
    ));
    assert!(matches!(
        h.service.verify_access_token("not.a.jwt").await,
        Err(AuthError::TokenMalformed)
    ));
}
