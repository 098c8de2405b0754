//! Authentication API handlers.
//!
//! Login, token refresh, revocation and listing. Every token endpoint returns
//! the same [`TokenResponse`] shape.
//!
//! # Examples
//!
//! Obtain a token pair:
//! ```bash
//! curl -X POST http://localhost:8000/api/v1/auth/token \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "alice", "password": "Labitory2025"}'
//! ```
//!
//! Refresh:
//! ```bash
//! curl -X POST http://localhost:8000/api/v1/auth/token/refresh \
//!   -H "Content-Type: application/json" \
//!   -d '{"refresh_token": "eyJhbGciOiJIUzI1NiIs..."}'
//! ```

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use labitory::auth::{AuthError, LoginRequest, TokenPair, TokenType, User};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
    AppState,
    client::ClientInfo,
    error::{ApiError, ApiResult},
    middleware::AuthenticatedUser,
};
use crate::{
    logging,
    metrics::{self, LoginOutcome},
};

/// Longest user agent returned by the token listing
const USER_AGENT_DISPLAY_LEN: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsPayload {
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshPayload {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokePayload {
    pub jti: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: i64,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires: DateTime<Utc>,
    pub refresh_token_expires: DateTime<Utc>,
    pub token_type: &'static str,
}

impl TokenResponse {
    fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_expires: tokens.access_token_expires,
            refresh_token_expires: tokens.refresh_token_expires,
            token_type: "Bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenSummary {
    pub jti: Uuid,
    pub token_type: TokenType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn required(field: Option<String>, name: &str) -> ApiResult<String> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

/// Truncate to the display length, marking the cut with `...`
fn truncate_user_agent(agent: String) -> String {
    if agent.chars().count() <= USER_AGENT_DISPLAY_LEN {
        return agent;
    }
    let cut: String = agent.chars().take(USER_AGENT_DISPLAY_LEN).collect();
    format!("{cut}...")
}

/// Run the login flow and issue a token pair
async fn issue_for_credentials(
    state: &AppState,
    client: ClientInfo,
    payload: CredentialsPayload,
) -> ApiResult<Json<TokenResponse>> {
    let ClientInfo(client) = client;
    let request = LoginRequest {
        username: required(payload.username, "username")?,
        password: required(payload.password, "password")?,
        totp_code: payload.totp_code.filter(|code| !code.is_empty()),
    };

    match state.auth.login(&request, &client).await {
        Ok((user, tokens)) => {
            metrics::login_attempt(LoginOutcome::Success);
            metrics::token_pair_issued();
            Ok(Json(TokenResponse::new(&user, tokens)))
        }
        Err(err) => {
            match &err {
                AuthError::AccountLocked { reason, .. } => {
                    metrics::login_attempt(LoginOutcome::Locked);
                    metrics::lockout(lockout_scope(reason));
                    logging::log_security_event(
                        "login_locked",
                        None,
                        Some(&client.ip_address),
                        &format!("Login for {} rejected: {}", request.username, reason),
                    );
                }
                AuthError::TwoFactorRequired => {
                    metrics::login_attempt(LoginOutcome::TwoFactorRequired)
                }
                e if !e.is_internal() => metrics::login_attempt(LoginOutcome::Failure),
                _ => {}
            }
            Err(err.into())
        }
    }
}

fn lockout_scope(reason: &str) -> &'static str {
    match reason {
        "ip_lockout" => "ip",
        "identifier_lockout" => "identifier",
        _ => "account",
    }
}

/// Log in with username (or email) and password.
///
/// # Request Body
///
/// ```json
/// {
///   "username": "alice",
///   "password": "Labitory2025",
///   "totp_code": "123456"  // Required if 2FA is enabled
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: username or password missing
/// - `401 Unauthorized`: invalid credentials, inactive account or bad 2FA code
/// - `423 Locked`: IP, username or account locked out (one generic message)
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<CredentialsPayload>,
) -> ApiResult<Json<TokenResponse>> {
    issue_for_credentials(&state, client, payload).await
}

/// Obtain an API token pair.
///
/// Same contract as [`login`], for programmatic clients.
pub async fn obtain_token(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<CredentialsPayload>,
) -> ApiResult<Json<TokenResponse>> {
    issue_for_credentials(&state, client, payload).await
}

/// Exchange a refresh token for a new pair.
///
/// The presented refresh token is consumed; replaying it returns `401`.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> ApiResult<Json<TokenResponse>> {
    let refresh_token = required(payload.refresh_token, "refresh_token")?;

    let (user, tokens) = state.auth.tokens().refresh(&refresh_token).await?;

    metrics::token_pair_issued();
    metrics::tokens_revoked(1);
    Ok(Json(TokenResponse::new(&user, tokens)))
}

/// Revoke one of the caller's own tokens by jti.
///
/// # Errors
///
/// - `400 Bad Request`: jti missing or not a UUID
/// - `404 Not Found`: no such token, or it belongs to someone else
pub async fn revoke_token(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<RevokePayload>,
) -> ApiResult<Json<Value>> {
    let jti = required(payload.jti, "jti")?;
    let jti = Uuid::parse_str(&jti).map_err(|_| ApiError::BadRequest("Invalid jti".into()))?;

    let ClientInfo(client) = client;
    state
        .auth
        .tokens()
        .revoke_owned(&auth.user, jti, Some(&client))
        .await?;

    metrics::tokens_revoked(1);
    Ok(Json(json!({ "message": "Token revoked successfully" })))
}

/// Revoke every live token of the caller, including the one in use.
pub async fn revoke_all_tokens(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    client: ClientInfo,
) -> ApiResult<Json<Value>> {
    let ClientInfo(client) = client;
    let revoked = state
        .auth
        .tokens()
        .revoke_all(&auth.user, Some(&client))
        .await?;

    logging::log_security_event(
        "token_revoked",
        Some(auth.user.id),
        Some(&client.ip_address),
        &format!("All tokens revoked ({revoked})"),
    );
    metrics::tokens_revoked(revoked);
    Ok(Json(json!({
        "message": format!("Revoked {revoked} tokens"),
        "revoked": revoked,
    })))
}

/// List the caller's live tokens, newest first.
pub async fn list_tokens(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let tokens: Vec<TokenSummary> = state
        .auth
        .tokens()
        .list_active(auth.user.id)
        .await?
        .into_iter()
        .map(|token| TokenSummary {
            jti: token.jti,
            token_type: token.token_type,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
            ip_address: token.ip_address,
            user_agent: token.user_agent.map(truncate_user_agent),
        })
        .collect();

    Ok(Json(json!({
        "count": tokens.len(),
        "tokens": tokens,
    })))
}

/// Describe the access token used for this request.
pub async fn token_info(auth: AuthenticatedUser) -> Json<Value> {
    Json(json!({
        "user_id": auth.user.id,
        "username": auth.user.username,
        "is_active": auth.user.is_active,
        "token_valid": true,
    }))
}
