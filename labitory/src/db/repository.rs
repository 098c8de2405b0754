//! Repository trait definitions for testability and dependency injection.
//!
//! Every store the security core touches sits behind a trait here, with a
//! PostgreSQL implementation below and an in-memory one in
//! [`crate::db::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::timeouts::{
    DEFAULT_TRANSACTION_TIMEOUT, TimeoutError, with_default_timeout, with_long_timeout, with_timeout,
};
use crate::audit::{NewSecurityEvent, SecurityEvent, SecurityEventType};
use crate::auth::models::{ApiToken, NewUser, TokenStats, TokenType, User, UserId, UserProfile};

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query did not finish in time
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row the operation depends on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated; carries the offending field
    #[error("Duplicate value for {0}")]
    Conflict(String),
}

impl From<TimeoutError> for RepositoryError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(duration) => RepositoryError::Timeout(duration),
            TimeoutError::Database(e) => RepositoryError::Database(e),
        }
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Trait for user and durable profile operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user together with an empty profile
    async fn create_user(&self, new_user: &NewUser) -> RepositoryResult<User>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> RepositoryResult<Option<User>>;

    /// Find user by exact username
    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;

    /// Find user by exact email
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    /// Stored password hash
    async fn password_hash(&self, user_id: UserId) -> RepositoryResult<Option<String>>;

    /// TOTP secret, if two-factor authentication is enabled
    async fn totp_secret(&self, user_id: UserId) -> RepositoryResult<Option<String>>;

    /// Enable (`Some`) or disable (`None`) two-factor authentication
    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> RepositoryResult<()>;

    /// Update user's last login timestamp
    async fn update_last_login(&self, user_id: UserId) -> RepositoryResult<()>;

    /// Every user with their profile, ordered by username
    async fn list_accounts(&self) -> RepositoryResult<Vec<(User, Option<UserProfile>)>>;

    /// Durable security profile
    async fn get_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>>;

    /// Mark the profile locked until `locked_until`
    ///
    /// Returns `NotFound` if the user has no profile.
    async fn set_profile_lock(
        &self,
        user_id: UserId,
        locked_until: DateTime<Utc>,
        reason: &str,
    ) -> RepositoryResult<()>;

    /// Clear the profile lock fields
    ///
    /// Returns `NotFound` if the user has no profile.
    async fn clear_profile_lock(&self, user_id: UserId) -> RepositoryResult<()>;

    /// Bump the consecutive failure counter, returning the new value
    async fn record_failed_login(&self, user_id: UserId) -> RepositoryResult<i32>;

    /// Reset the consecutive failure counter
    async fn reset_failed_logins(&self, user_id: UserId) -> RepositoryResult<()>;

    /// Check the store is reachable
    async fn ping(&self) -> RepositoryResult<()>;
}

/// Trait for issued-token metadata
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store metadata for a newly issued token
    async fn insert(&self, token: &ApiToken) -> RepositoryResult<()>;

    /// Find token metadata by jti
    async fn find(&self, jti: Uuid) -> RepositoryResult<Option<ApiToken>>;

    /// Whether the jti is on the deny-list. A jti without a metadata row
    /// counts as revoked, so retention cleanup never revives a token.
    async fn is_revoked(&self, jti: Uuid) -> RepositoryResult<bool>;

    /// Revoke a token. Returns false if it was unknown or already revoked.
    async fn revoke(&self, jti: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Revoke a token only if `user_id` owns it
    async fn revoke_for_user(
        &self,
        user_id: UserId,
        jti: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Revoke every live token of a user, returning how many changed
    async fn revoke_all_for_user(&self, user_id: UserId, at: DateTime<Utc>) -> RepositoryResult<u64>;

    /// Unrevoked, unexpired tokens of a user, newest first
    async fn list_active(&self, user_id: UserId, now: DateTime<Utc>) -> RepositoryResult<Vec<ApiToken>>;

    /// Record when and from where a token was last used
    async fn record_usage(
        &self,
        jti: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Number of tokens past their expiry
    async fn count_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64>;

    /// Delete tokens past their expiry
    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64>;

    /// Number of tokens revoked before `cutoff`
    async fn count_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;

    /// Delete tokens revoked before `cutoff`
    async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;

    /// Total and active token counts
    async fn stats(&self, now: DateTime<Utc>) -> RepositoryResult<TokenStats>;
}

/// Trait for the append-only security event log
#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    /// Append an event
    async fn append(&self, event: &NewSecurityEvent) -> RepositoryResult<SecurityEvent>;

    /// Most recent events, newest first
    async fn recent(&self, user_id: Option<UserId>, limit: usize) -> RepositoryResult<Vec<SecurityEvent>>;
}

const USER_COLUMNS: &str = "id, username, email, is_active, is_superuser, created_at, last_login";

const PROFILE_COLUMNS: &str =
    "user_id, account_locked, locked_until, lock_reason, failed_login_attempts, last_failed_login";

const TOKEN_COLUMNS: &str = "jti, user_id, token_type, created_at, expires_at, is_revoked, \
     revoked_at, last_used_at, ip_address, user_agent";

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        is_active: row.try_get("is_active")?,
        is_superuser: row.try_get("is_superuser")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile, sqlx::Error> {
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        account_locked: row.try_get("account_locked")?,
        locked_until: row.try_get("locked_until")?,
        lock_reason: row.try_get("lock_reason")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        last_failed_login: row.try_get("last_failed_login")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<ApiToken, sqlx::Error> {
    let raw_type: String = row.try_get("token_type")?;
    let token_type = TokenType::parse(&raw_type)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown token type: {raw_type}").into()))?;

    Ok(ApiToken {
        jti: row.try_get("jti")?,
        user_id: row.try_get("user_id")?,
        token_type,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_revoked: row.try_get("is_revoked")?,
        revoked_at: row.try_get("revoked_at")?,
        last_used_at: row.try_get("last_used_at")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<SecurityEvent, sqlx::Error> {
    let raw_type: String = row.try_get("event_type")?;
    let event_type = SecurityEventType::parse(&raw_type)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown event type: {raw_type}").into()))?;

    Ok(SecurityEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_type,
        description: row.try_get("description")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        metadata: row.try_get::<Value, _>("metadata")?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        let field = match db_err.constraint() {
            Some(constraint) if constraint.contains("email") => "email",
            _ => "username",
        };
        return RepositoryError::Conflict(field.to_string());
    }
    RepositoryError::Database(err)
}

fn require_row(rows_affected: u64, what: impl FnOnce() -> String) -> RepositoryResult<()> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound(what()));
    }
    Ok(())
}

/// Default PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(value).fetch_optional(&self.pool)).await?;
        Ok(row.map(|r| user_from_row(&r)).transpose()?)
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, new_user: &NewUser) -> RepositoryResult<User> {
        let result = with_timeout(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;

            let sql = format!(
                "INSERT INTO users (username, email, password_hash, is_active, is_superuser)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {USER_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(&new_user.username)
                .bind(&new_user.email)
                .bind(&new_user.password_hash)
                .bind(new_user.is_active)
                .bind(new_user.is_superuser)
                .fetch_one(&mut *tx)
                .await?;
            let user = user_from_row(&row)?;

            sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1)")
                .bind(user.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(user)
        })
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(TimeoutError::Database(e)) => Err(map_unique_violation(e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, user_id: UserId) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(user_id).fetch_optional(&self.pool)).await?;
        Ok(row.map(|r| user_from_row(&r)).transpose()?)
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn password_hash(&self, user_id: UserId) -> RepositoryResult<Option<String>> {
        let hash = with_default_timeout(
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(hash)
    }

    async fn totp_secret(&self, user_id: UserId) -> RepositoryResult<Option<String>> {
        let secret = with_default_timeout(
            sqlx::query_scalar::<_, Option<String>>("SELECT totp_secret FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(secret.flatten())
    }

    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> RepositoryResult<()> {
        let result = with_default_timeout(
            sqlx::query("UPDATE users SET totp_secret = $2 WHERE id = $1")
                .bind(user_id)
                .bind(secret)
                .execute(&self.pool),
        )
        .await?;
        require_row(result.rows_affected(), || format!("user {user_id}"))
    }

    async fn update_last_login(&self, user_id: UserId) -> RepositoryResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn list_accounts(&self) -> RepositoryResult<Vec<(User, Option<UserProfile>)>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT u.id, u.username, u.email, u.is_active, u.is_superuser, u.created_at,
                        u.last_login, p.user_id, p.account_locked, p.locked_until, p.lock_reason,
                        p.failed_login_attempts, p.last_failed_login
                 FROM users u
                 LEFT JOIN user_profiles p ON p.user_id = u.id
                 ORDER BY u.username",
            )
            .fetch_all(&self.pool),
        )
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            let user = user_from_row(row)?;
            let profile = match row.try_get::<Option<UserId>, _>("user_id")? {
                Some(_) => Some(profile_from_row(row)?),
                None => None,
            };
            accounts.push((user, profile));
        }
        Ok(accounts)
    }

    async fn get_profile(&self, user_id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(user_id).fetch_optional(&self.pool)).await?;
        Ok(row.map(|r| profile_from_row(&r)).transpose()?)
    }

    async fn set_profile_lock(
        &self,
        user_id: UserId,
        locked_until: DateTime<Utc>,
        reason: &str,
    ) -> RepositoryResult<()> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE user_profiles
                 SET account_locked = TRUE, locked_until = $2, lock_reason = $3
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(locked_until)
            .bind(reason)
            .execute(&self.pool),
        )
        .await?;
        require_row(result.rows_affected(), || format!("profile for user {user_id}"))
    }

    async fn clear_profile_lock(&self, user_id: UserId) -> RepositoryResult<()> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE user_profiles
                 SET account_locked = FALSE, locked_until = NULL, lock_reason = NULL
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .execute(&self.pool),
        )
        .await?;
        require_row(result.rows_affected(), || format!("profile for user {user_id}"))
    }

    async fn record_failed_login(&self, user_id: UserId) -> RepositoryResult<i32> {
        let count = with_default_timeout(
            sqlx::query_scalar::<_, i32>(
                "UPDATE user_profiles
                 SET failed_login_attempts = failed_login_attempts + 1, last_failed_login = NOW()
                 WHERE user_id = $1
                 RETURNING failed_login_attempts",
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await?;
        count.ok_or_else(|| RepositoryError::NotFound(format!("profile for user {user_id}")))
    }

    async fn reset_failed_logins(&self, user_id: UserId) -> RepositoryResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE user_profiles SET failed_login_attempts = 0 WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        with_default_timeout(sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}

/// Default PostgreSQL implementation of `TokenRepository`
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str, at: DateTime<Utc>) -> RepositoryResult<u64> {
        let count = with_default_timeout(
            sqlx::query_scalar::<_, i64>(sql).bind(at).fetch_one(&self.pool),
        )
        .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert(&self, token: &ApiToken) -> RepositoryResult<()> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO api_tokens (jti, user_id, token_type, created_at, expires_at,
                                         is_revoked, revoked_at, last_used_at, ip_address, user_agent)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(token.jti)
            .bind(token.user_id)
            .bind(token.token_type.as_str())
            .bind(token.created_at)
            .bind(token.expires_at)
            .bind(token.is_revoked)
            .bind(token.revoked_at)
            .bind(token.last_used_at)
            .bind(&token.ip_address)
            .bind(&token.user_agent)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find(&self, jti: Uuid) -> RepositoryResult<Option<ApiToken>> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE jti = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(jti).fetch_optional(&self.pool)).await?;
        Ok(row.map(|r| token_from_row(&r)).transpose()?)
    }

    async fn is_revoked(&self, jti: Uuid) -> RepositoryResult<bool> {
        let revoked = with_default_timeout(
            sqlx::query_scalar::<_, bool>(
                "SELECT NOT EXISTS(SELECT 1 FROM api_tokens WHERE jti = $1 AND NOT is_revoked)",
            )
            .bind(jti)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(revoked)
    }

    async fn revoke(&self, jti: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE api_tokens SET is_revoked = TRUE, revoked_at = $2
                 WHERE jti = $1 AND NOT is_revoked",
            )
            .bind(jti)
            .bind(at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_for_user(
        &self,
        user_id: UserId,
        jti: Uuid,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE api_tokens SET is_revoked = TRUE, revoked_at = $3
                 WHERE jti = $1 AND user_id = $2 AND NOT is_revoked",
            )
            .bind(jti)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: UserId, at: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE api_tokens SET is_revoked = TRUE, revoked_at = $2
                 WHERE user_id = $1 AND NOT is_revoked",
            )
            .bind(user_id)
            .bind(at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active(&self, user_id: UserId, now: DateTime<Utc>) -> RepositoryResult<Vec<ApiToken>> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens
             WHERE user_id = $1 AND NOT is_revoked AND expires_at > $2
             ORDER BY created_at DESC"
        );
        let rows = with_default_timeout(
            sqlx::query(&sql).bind(user_id).bind(now).fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.iter().map(token_from_row).collect::<Result<_, _>>()?)
    }

    async fn record_usage(
        &self,
        jti: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        with_default_timeout(
            sqlx::query(
                "UPDATE api_tokens
                 SET last_used_at = $2,
                     ip_address = COALESCE($3, ip_address),
                     user_agent = COALESCE($4, user_agent)
                 WHERE jti = $1",
            )
            .bind(jti)
            .bind(at)
            .bind(ip_address)
            .bind(user_agent)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        self.count("SELECT COUNT(*) FROM api_tokens WHERE expires_at < $1", now)
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = with_long_timeout(
            sqlx::query("DELETE FROM api_tokens WHERE expires_at < $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM api_tokens WHERE is_revoked AND revoked_at < $1",
            cutoff,
        )
        .await
    }

    async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = with_long_timeout(
            sqlx::query("DELETE FROM api_tokens WHERE is_revoked AND revoked_at < $1")
                .bind(cutoff)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self, now: DateTime<Utc>) -> RepositoryResult<TokenStats> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT COUNT(*) AS total,
                        COUNT(*) FILTER (WHERE NOT is_revoked AND expires_at > $1) AS active
                 FROM api_tokens",
            )
            .bind(now)
            .fetch_one(&self.pool),
        )
        .await?;

        let total: i64 = row.try_get("total")?;
        let active: i64 = row.try_get("active")?;
        Ok(TokenStats {
            total: total.max(0) as u64,
            active: active.max(0) as u64,
        })
    }
}

/// Default PostgreSQL implementation of `SecurityEventRepository`
pub struct PgSecurityEventRepository {
    pool: PgPool,
}

impl PgSecurityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityEventRepository for PgSecurityEventRepository {
    async fn append(&self, event: &NewSecurityEvent) -> RepositoryResult<SecurityEvent> {
        let row = with_default_timeout(
            sqlx::query(
                "INSERT INTO security_events (user_id, event_type, description, ip_address,
                                              user_agent, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, user_id, event_type, description, ip_address, user_agent,
                           metadata, timestamp",
            )
            .bind(event.user_id)
            .bind(event.event_type.as_str())
            .bind(&event.description)
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(&event.metadata)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(event_from_row(&row)?)
    }

    async fn recent(&self, user_id: Option<UserId>, limit: usize) -> RepositoryResult<Vec<SecurityEvent>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT id, user_id, event_type, description, ip_address, user_agent,
                        metadata, timestamp
                 FROM security_events
                 WHERE $1::BIGINT IS NULL OR user_id = $1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT $2",
            )
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.iter().map(event_from_row).collect::<Result<_, _>>()?)
    }
}
