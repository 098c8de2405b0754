//! Authentication middleware for protected endpoints.
//!
//! Validates the `Authorization: Bearer <token>` access token and injects an
//! [`AuthenticatedUser`] into request extensions for downstream handlers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware};
//! # use lab_server::api::middleware::{auth_middleware, AuthenticatedUser};
//! # use lab_server::api::AppState;
//! # let state: AppState = unimplemented!();
//!
//! async fn whoami(user: AuthenticatedUser) -> String {
//!     format!("Authenticated as {}", user.user.username)
//! }
//!
//! let protected: Router<AppState> = Router::new()
//!     .route("/whoami", get(whoami))
//!     .layer(middleware::from_fn_with_state(state, auth_middleware));
//! # let _ = protected;
//! ```

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use labitory::auth::{Claims, User};

use super::{AppState, client::ClientInfo, error::ApiError};

/// Owner and claims of a verified access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub claims: Claims,
}

/// Verify the bearer access token and record its use
///
/// # Behavior
///
/// - **Success**: injects [`AuthenticatedUser`] and calls the next handler
/// - **Missing or non-Bearer header**: `401 Unauthorized`
/// - **Expired, revoked, malformed or wrong-type token**: `401 Unauthorized`
///   with the matching message
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided".into()))?;

    let (user, claims) = state.auth.tokens().verify_access_token(token).await?;

    let ClientInfo(client) = ClientInfo::new(request.headers(), request.extensions());

    if let Err(e) = state.auth.tokens().record_usage(claims.jti, &client).await {
        tracing::warn!(jti = %claims.jti, error = %e, "Could not record token usage");
    }

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, claims });
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))
    }
}
