//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// User model
///
/// Password hash and TOTP secret are stored with the user but never loaded
/// into this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Durable per-user security state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub account_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub lock_reason: Option<String>,
    pub failed_login_attempts: i32,
    pub last_failed_login: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Fresh profile with no lockout and no failures
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            account_locked: false,
            locked_until: None,
            lock_reason: None,
            failed_login_attempts: 0,
            last_failed_login: None,
        }
    }
}

/// Values needed to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub totp_code: Option<String>,
}

/// Where a request came from, for lockout keys and audit rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent,
        }
    }
}

/// JWT token kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access" => Some(TokenType::Access),
            "refresh" => Some(TokenType::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>, // access tokens only
    pub exp: i64,
    pub iat: i64,
    pub jti: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// Freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_jti: Uuid,
    pub refresh_jti: Uuid,
    pub access_token_expires: DateTime<Utc>,
    pub refresh_token_expires: DateTime<Utc>,
}

/// Server-side metadata for an issued token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiToken {
    pub jti: Uuid,
    pub user_id: UserId,
    pub token_type: TokenType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ApiToken {
    /// Metadata row for a token issued now
    pub fn issued(
        jti: Uuid,
        user_id: UserId,
        token_type: TokenType,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            jti,
            user_id,
            token_type,
            created_at,
            expires_at,
            is_revoked: false,
            revoked_at: None,
            last_used_at: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Not expired and not revoked
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_revoked
    }
}

/// Token table counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStats {
    pub total: u64,
    pub active: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_claims_serialize_type_field() {
        let claims = Claims {
            user_id: 7,
            username: None,
            exp: 100,
            iat: 50,
            jti: Uuid::nil(),
            token_type: TokenType::Refresh,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["user_id"], 7);
        assert!(json.get("username").is_none());
    }

    #[test]
    fn test_token_type_parse() {
        assert_eq!(TokenType::parse("access"), Some(TokenType::Access));
        assert_eq!(TokenType::parse("refresh"), Some(TokenType::Refresh));
        assert_eq!(TokenType::parse("bearer"), None);
    }

    #[test]
    fn test_api_token_validity() {
        let now = Utc::now();
        let mut token = ApiToken::issued(
            Uuid::new_v4(),
            1,
            TokenType::Access,
            now,
            now + Duration::minutes(15),
        );
        assert!(token.is_valid(now));
        assert!(token.is_expired(now + Duration::minutes(16)));

        token.is_revoked = true;
        assert!(!token.is_valid(now));
    }
}
