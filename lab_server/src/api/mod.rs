//! HTTP API for the authentication service.
//!
//! # Modules
//!
//! - [`auth`]: login, token refresh, revocation and listing
//! - [`middleware`]: bearer-token authentication for protected endpoints
//! - [`rate_limiter`]: per-IP sliding-window limiter on `/api/v1/auth/*`
//! - [`request_id`]: `x-request-id` propagation and request spans
//! - [`client`]: client IP and user agent extraction
//! - [`error`]: JSON error responses
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lab_server::api::{create_router, AppState};
//! use lab_server::api::rate_limiter::IpRateLimiter;
//! use lab_server::config::RateLimitConfig;
//! use labitory::{AuthManager, CacheStore};
//! use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let auth: AuthManager = unimplemented!();
//! # let cache: Arc<dyn CacheStore> = unimplemented!();
//!
//! let state = AppState {
//!     auth: Arc::new(auth),
//!     cache,
//!     rate_limiter: Arc::new(IpRateLimiter::new(RateLimitConfig::default())),
//! };
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use labitory::{AuthManager, CacheStore, cache};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use rate_limiter::IpRateLimiter;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    /// Store behind the attempt counters, probed by the health check
    pub cache: Arc<dyn CacheStore>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                          - Health check (public)
/// POST /api/v1/auth/login               - Login (public)
/// POST /api/v1/auth/token               - Obtain token pair (public)
/// POST /api/v1/auth/token/refresh       - Rotate refresh token (public)
/// POST /api/v1/auth/token/revoke        - Revoke own token (auth required)
/// POST /api/v1/auth/token/revoke-all    - Revoke all own tokens (auth required)
/// GET  /api/v1/auth/tokens              - List own live tokens (auth required)
/// GET  /api/v1/auth/token/info          - Current token owner (auth required)
/// ```
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/token", post(auth::obtain_token))
        .route("/token/refresh", post(auth::refresh_token));

    let protected_routes = Router::new()
        .route("/token/revoke", post(auth::revoke_token))
        .route("/token/revoke-all", post(auth::revoke_all_tokens))
        .route("/tokens", get(auth::list_tokens))
        .route("/token/info", get(auth::token_info))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let auth_routes = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limiter::rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/auth", auth_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id::request_id_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the user store and the cache both respond, or
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8000/health
/// # {"status":"healthy","version":"1.4.0","database":true,"cache":true,"timestamp":"..."}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match state.auth.users().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check: database unreachable");
            false
        }
    };

    let cache_healthy = match cache::probe(state.cache.as_ref()).await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::error!(error = %e, "Health check: cache unreachable");
            false
        }
    };

    let overall_healthy = db_healthy && cache_healthy;
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "cache": cache_healthy,
        "cache_backend": state.cache.backend_name(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
