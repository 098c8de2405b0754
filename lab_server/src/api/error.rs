//! JSON error responses for the HTTP API.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use labitory::AuthError;
use serde_json::json;

/// Handler error. Every variant renders as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Missing or malformed request field
    #[error("{0}")]
    BadRequest(String),

    /// Missing or malformed `Authorization` header
    #[error("{0}")]
    Unauthorized(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(err) => auth_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::Auth(AuthError::RateLimited { retry_after }) => Some(*retry_after),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Auth(err) => err.client_message(),
            other => other.to_string(),
        }
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidUsername(_)
        | AuthError::WeakPassword(_)
        | AuthError::UsernameTaken
        | AuthError::EmailTaken => StatusCode::BAD_REQUEST,
        AuthError::TokenNotFound => StatusCode::NOT_FOUND,
        AuthError::AccountLocked { .. } => StatusCode::LOCKED,
        AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Repository(_)
        | AuthError::Security(_)
        | AuthError::Jwt(_)
        | AuthError::HashingFailed => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::InvalidCredentials
        | AuthError::TokenExpired
        | AuthError::TokenRevoked
        | AuthError::TokenMalformed
        | AuthError::InvalidTokenType
        | AuthError::UserInactive
        | AuthError::UserNotFound
        | AuthError::TwoFactorRequired
        | AuthError::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
        }

        let mut response = (status, Json(json!({ "error": self.message() }))).into_response();
        if let Some(retry_after) = self.retry_after()
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labitory::auth::errors::LOCKED_MESSAGE;
    use labitory::db::RepositoryError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::TokenNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AuthError::WeakPassword("short".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::AccountLocked {
                reason: "ip_lockout".into(),
                until: None
            })
            .status(),
            StatusCode::LOCKED
        );
        assert_eq!(
            ApiError::from(AuthError::RateLimited { retry_after: 5 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_lockout_reason_not_exposed() {
        let err = ApiError::from(AuthError::AccountLocked {
            reason: "identifier_lockout".into(),
            until: None,
        });
        assert_eq!(err.message(), LOCKED_MESSAGE);
    }

    #[test]
    fn test_internal_errors_sanitized() {
        let err = ApiError::from(AuthError::Repository(RepositoryError::NotFound(
            "user_profiles row 7".into(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Internal server error");
    }

    #[test]
    fn test_retry_after_header() {
        let err = ApiError::from(AuthError::RateLimited { retry_after: 42 });
        assert_eq!(err.message(), "Rate limit exceeded. Please try again later.");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");

        let response = ApiError::BadRequest("jti required".into()).into_response();
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
