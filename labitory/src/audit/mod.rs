//! Append-only security event log.
//!
//! Every login outcome, lockout and token revocation is recorded as a
//! [`SecurityEvent`]. Writes go through [`AuditLog`], which never fails the
//! surrounding operation: a failed write is logged and dropped.

use crate::auth::models::{ClientContext, UserId};
use crate::db::repository::{RepositoryResult, SecurityEventRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};

/// Kind of security event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginAttempt,
    FailedLogin,
    PasswordChange,
    #[serde(rename = "2fa_enabled")]
    TwoFactorEnabled,
    #[serde(rename = "2fa_disabled")]
    TwoFactorDisabled,
    TokenCreated,
    TokenRevoked,
    SuspiciousActivity,
    AccountLocked,
    PermissionDenied,
}

impl SecurityEventType {
    /// All event types, in declaration order
    pub const ALL: [SecurityEventType; 10] = [
        SecurityEventType::LoginAttempt,
        SecurityEventType::FailedLogin,
        SecurityEventType::PasswordChange,
        SecurityEventType::TwoFactorEnabled,
        SecurityEventType::TwoFactorDisabled,
        SecurityEventType::TokenCreated,
        SecurityEventType::TokenRevoked,
        SecurityEventType::SuspiciousActivity,
        SecurityEventType::AccountLocked,
        SecurityEventType::PermissionDenied,
    ];

    /// Stored column value
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginAttempt => "login_attempt",
            SecurityEventType::FailedLogin => "failed_login",
            SecurityEventType::PasswordChange => "password_change",
            SecurityEventType::TwoFactorEnabled => "2fa_enabled",
            SecurityEventType::TwoFactorDisabled => "2fa_disabled",
            SecurityEventType::TokenCreated => "token_created",
            SecurityEventType::TokenRevoked => "token_revoked",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::AccountLocked => "account_locked",
            SecurityEventType::PermissionDenied => "permission_denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored security event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityEvent {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub event_type: SecurityEventType,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// Event waiting to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewSecurityEvent {
    pub user_id: Option<UserId>,
    pub event_type: SecurityEventType,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub metadata: Value,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType, description: impl Into<String>) -> Self {
        Self {
            user_id: None,
            event_type,
            description: description.into(),
            ip_address: None,
            user_agent: String::new(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach request origin
    pub fn client(mut self, client: &ClientContext) -> Self {
        self.ip_address = Some(client.ip_address.clone());
        self.user_agent = client.user_agent.clone().unwrap_or_default();
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Best-effort writer for security events
#[derive(Clone)]
pub struct AuditLog {
    repository: Arc<dyn SecurityEventRepository>,
}

impl AuditLog {
    pub fn new(repository: Arc<dyn SecurityEventRepository>) -> Self {
        Self { repository }
    }

    /// Append an event, logging rather than returning write failures
    pub async fn record(&self, event: NewSecurityEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.repository.append(&event).await {
            log::error!("Failed to record {} security event: {}", event_type, e);
        }
    }

    /// Most recent events, newest first, optionally for one user
    pub async fn recent(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> RepositoryResult<Vec<SecurityEvent>> {
        self.repository.recent(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemorySecurityEventRepository;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trip() {
        for event_type in SecurityEventType::ALL {
            assert_eq!(SecurityEventType::parse(event_type.as_str()), Some(event_type));
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, event_type.as_str());
        }
        assert_eq!(SecurityEventType::parse("logout"), None);
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let repo = Arc::new(MemorySecurityEventRepository::new());
        let audit = AuditLog::new(repo.clone());
        let client = ClientContext::new("10.0.0.7", Some("curl/8.0".to_string()));

        audit
            .record(
                NewSecurityEvent::new(SecurityEventType::FailedLogin, "Failed login attempt")
                    .user(3)
                    .client(&client)
                    .metadata(json!({ "username": "alice" })),
            )
            .await;
        audit
            .record(NewSecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                "Unknown user probed",
            ))
            .await;

        let all = audit.recent(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, SecurityEventType::SuspiciousActivity);

        let mine = audit.recent(Some(3), 10).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(mine[0].user_agent, "curl/8.0");
        assert_eq!(mine[0].metadata["username"], "alice");
    }
}
