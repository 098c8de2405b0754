//! In-memory repository implementations.
//!
//! Used by the integration tests and by single-process development setups
//! without PostgreSQL. Behaviour matches the Pg implementations, including
//! unique username/email constraints and `NotFound` for missing profiles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::{
    RepositoryError, RepositoryResult, SecurityEventRepository, TokenRepository, UserRepository,
};
use crate::audit::{NewSecurityEvent, SecurityEvent};
use crate::auth::models::{ApiToken, NewUser, TokenStats, User, UserId, UserProfile};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
    totp_secret: Option<String>,
}

/// In-memory `UserRepository`
#[derive(Debug, Clone)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, StoredUser>>>,
    profiles: Arc<RwLock<HashMap<UserId, UserProfile>>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Drop a user's profile row, leaving only cache-backed lockout state
    pub async fn remove_profile(&self, user_id: UserId) {
        self.profiles.write().await.remove(&user_id);
    }

    /// Enable or disable a user
    pub async fn set_active(&self, user_id: UserId, is_active: bool) {
        if let Some(stored) = self.users.write().await.get_mut(&user_id) {
            stored.user.is_active = is_active;
        }
    }

    /// Delete a user and their profile
    pub async fn delete_user(&self, user_id: UserId) {
        self.users.write().await.remove(&user_id);
        self.profiles.write().await.remove(&user_id);
    }

    async fn find_where(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .map(|stored| &stored.user)
            .find(|user| pred(user))
            .cloned()
    }

    fn missing_profile(user_id: UserId) -> RepositoryError {
        RepositoryError::NotFound(format!("profile for user {user_id}"))
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(&self, new_user: &NewUser) -> RepositoryResult<User> {
        let mut users = self.users.write().await;

        if users.values().any(|s| s.user.username == new_user.username) {
            return Err(RepositoryError::Conflict("username".to_string()));
        }
        if let Some(email) = &new_user.email
            && users.values().any(|s| s.user.email.as_ref() == Some(email))
        {
            return Err(RepositoryError::Conflict("email".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            is_active: new_user.is_active,
            is_superuser: new_user.is_superuser,
            created_at: Utc::now(),
            last_login: None,
        };

        users.insert(
            id,
            StoredUser {
                user: user.clone(),
                password_hash: new_user.password_hash.clone(),
                totp_secret: None,
            },
        );
        self.profiles.write().await.insert(id, UserProfile::new(id));

        Ok(user)
    }

    async fn find_by_id(&self, user_id: UserId) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).map(|s| s.user.clone()))
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find_where(|u| u.username == username).await)
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find_where(|u| u.email.as_deref() == Some(email)).await)
    }

    async fn password_hash(&self, user_id: UserId) -> RepositoryResult<Option<String>> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .map(|s| s.password_hash.clone()))
    }

    async fn totp_secret(&self, user_id: UserId) -> RepositoryResult<Option<String>> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .and_then(|s| s.totp_secret.clone()))
    }

    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {user_id}")))?;
        stored.totp_secret = secret.map(str::to_string);
        Ok(())
    }

    async fn update_last_login(&self, user_id: UserId) -> RepositoryResult<()> {
        if let Some(stored) = self.users.write().await.get_mut(&user_id) {
            stored.user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_accounts(&self) -> RepositoryResult<Vec<(User, Option<UserProfile>)>> {
        let users = self.users.read().await;
        let profiles = self.profiles.read().await;

        let mut accounts: Vec<_> = users
            .values()
            .map(|s| (s.user.clone(), profiles.get(&s.user.id).cloned()))
            .collect();
        accounts.sort_by(|a, b| a.0.username.cmp(&b.0.username));
        Ok(accounts)
    }

    async fn get_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn set_profile_lock(
        &self,
        user_id: UserId,
        locked_until: DateTime<Utc>,
        reason: &str,
    ) -> RepositoryResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&user_id)
            .ok_or_else(|| Self::missing_profile(user_id))?;
        profile.account_locked = true;
        profile.locked_until = Some(locked_until);
        profile.lock_reason = Some(reason.to_string());
        Ok(())
    }

    async fn clear_profile_lock(&self, user_id: UserId) -> RepositoryResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&user_id)
            .ok_or_else(|| Self::missing_profile(user_id))?;
        profile.account_locked = false;
        profile.locked_until = None;
        profile.lock_reason = None;
        Ok(())
    }

    async fn record_failed_login(&self, user_id: UserId) -> RepositoryResult<i32> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&user_id)
            .ok_or_else(|| Self::missing_profile(user_id))?;
        profile.failed_login_attempts += 1;
        profile.last_failed_login = Some(Utc::now());
        Ok(profile.failed_login_attempts)
    }

    async fn reset_failed_logins(&self, user_id: UserId) -> RepositoryResult<()> {
        if let Some(profile) = self.profiles.write().await.get_mut(&user_id) {
            profile.failed_login_attempts = 0;
        }
        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

/// In-memory `TokenRepository`
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenRepository {
    tokens: Arc<RwLock<HashMap<Uuid, ApiToken>>>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, live or not
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn insert(&self, token: &ApiToken) -> RepositoryResult<()> {
        self.tokens.write().await.insert(token.jti, token.clone());
        Ok(())
    }

    async fn find(&self, jti: Uuid) -> RepositoryResult<Option<ApiToken>> {
        Ok(self.tokens.read().await.get(&jti).cloned())
    }

    async fn is_revoked(&self, jti: Uuid) -> RepositoryResult<bool> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&jti)
            .is_none_or(|t| t.is_revoked))
    }

    async fn revoke(&self, jti: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&jti) {
            Some(token) if !token.is_revoked => {
                token.is_revoked = true;
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_for_user(
        &self,
        user_id: UserId,
        jti: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&jti) {
            Some(token) if token.user_id == user_id && !token.is_revoked => {
                token.is_revoked = true;
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: UserId, at: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut count = 0;
        for token in self.tokens.write().await.values_mut() {
            if token.user_id == user_id && !token.is_revoked {
                token.is_revoked = true;
                token.revoked_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active(&self, user_id: UserId, now: DateTime<Utc>) -> RepositoryResult<Vec<ApiToken>> {
        let mut active: Vec<_> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id && t.is_valid(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn record_usage(
        &self,
        jti: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        if let Some(token) = self.tokens.write().await.get_mut(&jti) {
            token.last_used_at = Some(at);
            if let Some(ip) = ip_address {
                token.ip_address = Some(ip.to_string());
            }
            if let Some(agent) = user_agent {
                token.user_agent = Some(agent.to_string());
            }
        }
        Ok(())
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.expires_at < now)
            .count() as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }

    async fn count_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.is_revoked && t.revoked_at.is_some_and(|at| at < cutoff))
            .count() as u64)
    }

    async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !(t.is_revoked && t.revoked_at.is_some_and(|at| at < cutoff)));
        Ok((before - tokens.len()) as u64)
    }

    async fn stats(&self, now: DateTime<Utc>) -> RepositoryResult<TokenStats> {
        let tokens = self.tokens.read().await;
        Ok(TokenStats {
            total: tokens.len() as u64,
            active: tokens.values().filter(|t| t.is_valid(now)).count() as u64,
        })
    }
}

/// In-memory `SecurityEventRepository`
#[derive(Debug, Clone, Default)]
pub struct MemorySecurityEventRepository {
    events: Arc<RwLock<Vec<SecurityEvent>>>,
}

impl MemorySecurityEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event, oldest first
    pub async fn all(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl SecurityEventRepository for MemorySecurityEventRepository {
    async fn append(&self, event: &NewSecurityEvent) -> RepositoryResult<SecurityEvent> {
        let mut events = self.events.write().await;
        let stored = SecurityEvent {
            id: events.len() as i64 + 1,
            user_id: event.user_id,
            event_type: event.event_type,
            description: event.description.clone(),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            metadata: event.metadata.clone(),
            timestamp: Utc::now(),
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, user_id: Option<UserId>, limit: usize) -> RepositoryResult<Vec<SecurityEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| user_id.is_none() || e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
