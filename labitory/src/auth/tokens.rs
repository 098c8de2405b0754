//! JWT access/refresh tokens with server-side revocation.
//!
//! Tokens are HS256 JWTs. Every issued token has an [`ApiToken`] row keyed by
//! its `jti`; revoking a token flags that row, and both refresh and
//! [`TokenService::verify_access_token`] consult the flag, so a revoked token
//! stops working before it expires.

use super::{
    errors::{AuthError, AuthResult},
    models::{ApiToken, Claims, ClientContext, TokenPair, TokenStats, TokenType, User, UserId},
};
use crate::audit::{AuditLog, NewSecurityEvent, SecurityEventType};
use crate::db::config::parse_env_or;
use crate::db::repository::{TokenRepository, UserRepository};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Token lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::minutes(15),
            refresh_token_lifetime: Duration::days(7),
        }
    }
}

impl TokenSettings {
    /// Load lifetimes from the environment
    ///
    /// - `JWT_ACCESS_TOKEN_LIFETIME` minutes (default: 15)
    /// - `JWT_REFRESH_TOKEN_LIFETIME` days (default: 7)
    pub fn from_env() -> Self {
        Self {
            access_token_lifetime: Duration::minutes(parse_env_or("JWT_ACCESS_TOKEN_LIFETIME", 15)),
            refresh_token_lifetime: Duration::days(parse_env_or("JWT_REFRESH_TOKEN_LIFETIME", 7)),
        }
    }

    fn lifetime(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_token_lifetime,
            TokenType::Refresh => self.refresh_token_lifetime,
        }
    }
}

/// Issues, verifies, rotates and revokes tokens
#[derive(Clone)]
pub struct TokenService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    audit: AuditLog,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    settings: TokenSettings,
}

impl TokenService {
    /// Create a new token service
    ///
    /// # Arguments
    ///
    /// * `jwt_secret` - HMAC signing secret
    /// * `settings` - Access and refresh lifetimes
    /// * `users` - Used to re-check the token owner on every verification
    /// * `tokens` - Issued-token metadata and revocation flags
    /// * `audit` - Receives revocation events
    pub fn new(
        jwt_secret: &str,
        settings: TokenSettings,
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        audit: AuditLog,
    ) -> Self {
        Self {
            users,
            tokens,
            audit,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issue an access/refresh pair and record both
    ///
    /// # Arguments
    ///
    /// * `user` - Token owner
    /// * `client` - Request origin stored on the metadata rows, if known
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the metadata rows cannot be stored.
    pub async fn generate_tokens(
        &self,
        user: &User,
        client: Option<&ClientContext>,
    ) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let (access_token, access) = self.issue(user, TokenType::Access, now, client).await?;
        let (refresh_token, refresh) = self.issue(user, TokenType::Refresh, now, client).await?;

        log::debug!("Issued token pair for user {}", user.id);

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_jti: access.jti,
            refresh_jti: refresh.jti,
            access_token_expires: access.expires_at,
            refresh_token_expires: refresh.expires_at,
        })
    }

    async fn issue(
        &self,
        user: &User,
        token_type: TokenType,
        now: DateTime<Utc>,
        client: Option<&ClientContext>,
    ) -> AuthResult<(String, ApiToken)> {
        let expires_at = now + self.settings.lifetime(token_type);
        let claims = Claims {
            user_id: user.id,
            username: (token_type == TokenType::Access).then(|| user.username.clone()),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let mut record = ApiToken::issued(claims.jti, user.id, token_type, now, expires_at);
        if let Some(client) = client {
            record.ip_address = Some(client.ip_address.clone());
            record.user_agent = client.user_agent.clone();
        }
        self.tokens.insert(&record).await?;

        Ok((token, record))
    }

    /// Check signature and expiry with zero leeway
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenExpired` - `exp` has passed
    /// * `AuthError::TokenMalformed` - Anything else wrong with the token
    pub fn decode(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed,
            })
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The presented refresh token is revoked; presenting it again fails
    /// with `TokenRevoked`. Returns the token owner alongside the new pair.
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenExpired` / `AuthError::TokenMalformed` - Decode failure
    /// * `AuthError::InvalidTokenType` - Not a refresh token
    /// * `AuthError::TokenRevoked` - Already used or revoked
    /// * `AuthError::UserNotFound` / `AuthError::UserInactive` - Owner gone or disabled
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(User, TokenPair)> {
        let claims = self.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidTokenType);
        }

        if self.tokens.is_revoked(claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        let user = self.active_user(claims.user_id).await?;

        // A concurrent refresh with the same token loses here
        if !self.tokens.revoke(claims.jti, Utc::now()).await? {
            return Err(AuthError::TokenRevoked);
        }

        let pair = self.generate_tokens(&user, None).await?;
        Ok((user, pair))
    }

    /// Authenticate a request's access token
    ///
    /// # Returns
    ///
    /// * The token owner and the decoded claims
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenExpired` / `AuthError::TokenMalformed` - Decode failure
    /// * `AuthError::InvalidTokenType` - Refresh token presented
    /// * `AuthError::UserNotFound` / `AuthError::UserInactive` - Owner gone or disabled
    /// * `AuthError::TokenRevoked` - jti is on the deny-list
    pub async fn verify_access_token(&self, token: &str) -> AuthResult<(User, Claims)> {
        let claims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidTokenType);
        }

        let user = self.active_user(claims.user_id).await?;

        if self.tokens.is_revoked(claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok((user, claims))
    }

    async fn active_user(&self, user_id: UserId) -> AuthResult<User> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }

    /// Revoke a token by jti. Returns false if unknown or already revoked.
    pub async fn revoke(&self, jti: Uuid) -> AuthResult<bool> {
        Ok(self.tokens.revoke(jti, Utc::now()).await?)
    }

    /// Revoke one of the user's own tokens
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenNotFound` - No such token, or another user owns it
    pub async fn revoke_owned(
        &self,
        user: &User,
        jti: Uuid,
        client: Option<&ClientContext>,
    ) -> AuthResult<()> {
        let token = self
            .tokens
            .find(jti)
            .await?
            .filter(|t| t.user_id == user.id)
            .ok_or(AuthError::TokenNotFound)?;

        self.tokens.revoke_for_user(user.id, jti, Utc::now()).await?;

        let mut event = NewSecurityEvent::new(
            SecurityEventType::TokenRevoked,
            format!("{} token revoked", token.token_type),
        )
        .user(user.id)
        .metadata(json!({ "jti": jti }));
        if let Some(client) = client {
            event = event.client(client);
        }
        self.audit.record(event).await;

        log::info!("Token {} revoked by user {}", jti, user.id);
        Ok(())
    }

    /// Revoke every live token of a user, returning how many were revoked
    pub async fn revoke_all(&self, user: &User, client: Option<&ClientContext>) -> AuthResult<u64> {
        let revoked = self.tokens.revoke_all_for_user(user.id, Utc::now()).await?;

        let mut event = NewSecurityEvent::new(
            SecurityEventType::TokenRevoked,
            format!("All tokens revoked ({revoked})"),
        )
        .user(user.id)
        .metadata(json!({ "revoked": revoked }));
        if let Some(client) = client {
            event = event.client(client);
        }
        self.audit.record(event).await;

        log::info!("Revoked {} tokens for user {}", revoked, user.id);
        Ok(revoked)
    }

    /// Live tokens of a user, newest first
    pub async fn list_active(&self, user_id: UserId) -> AuthResult<Vec<ApiToken>> {
        Ok(self.tokens.list_active(user_id, Utc::now()).await?)
    }

    /// Note that a token was just used, and from where
    pub async fn record_usage(&self, jti: Uuid, client: &ClientContext) -> AuthResult<()> {
        self.tokens
            .record_usage(
                jti,
                Some(&client.ip_address),
                client.user_agent.as_deref(),
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    /// Number of stored tokens past their expiry
    pub async fn expired_count(&self) -> AuthResult<u64> {
        Ok(self.tokens.count_expired(Utc::now()).await?)
    }

    /// Delete tokens past their expiry
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        let deleted = self.tokens.delete_expired(Utc::now()).await?;
        log::info!("Deleted {} expired tokens", deleted);
        Ok(deleted)
    }

    /// Number of tokens revoked more than `days` ago
    pub async fn revoked_older_than_count(&self, days: i64) -> AuthResult<u64> {
        let Some(cutoff) = revoked_cutoff(days) else {
            return Ok(0);
        };
        Ok(self.tokens.count_revoked_before(cutoff).await?)
    }

    /// Delete tokens revoked more than `days` ago
    ///
    /// An age reaching past the representable calendar matches nothing.
    pub async fn cleanup_revoked_older_than(&self, days: i64) -> AuthResult<u64> {
        let Some(cutoff) = revoked_cutoff(days) else {
            return Ok(0);
        };
        let deleted = self.tokens.delete_revoked_before(cutoff).await?;
        log::info!("Deleted {} tokens revoked over {} days ago", deleted, days);
        Ok(deleted)
    }

    pub async fn stats(&self) -> AuthResult<TokenStats> {
        Ok(self.tokens.stats(Utc::now()).await?)
    }
}

fn revoked_cutoff(days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|age| Utc::now().checked_sub_signed(age))
}
