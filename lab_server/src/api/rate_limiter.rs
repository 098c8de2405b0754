//! Per-IP request limiter for the authentication routes.
//!
//! Each client IP gets its own sliding window. Requests over the budget are
//! rejected with 429 and a `Retry-After` header until the oldest request in
//! the window ages out.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use labitory::AuthError;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{AppState, client::client_ip, error::ApiError};
use crate::{config::RateLimitConfig, metrics};

/// Tracked IPs above which idle windows are dropped
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use lab_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 10 requests per minute
    /// let limiter = RateLimiter::new(10, Duration::from_secs(60));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// # Example
    ///
    /// ```
    /// # use lab_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Get the number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Get the time until the oldest request leaves the window
    ///
    /// Returns `None` if there are no requests in the current window.
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn is_idle(&mut self) -> bool {
        self.evict(Instant::now());
        self.timestamps.is_empty()
    }
}

/// One sliding window per client IP
#[derive(Debug)]
pub struct IpRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateLimiter>>,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `ip`
    ///
    /// # Errors
    ///
    /// Returns the seconds to wait when the IP is over budget. Never fails
    /// when the limiter is disabled.
    pub async fn check(&self, ip: &str) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut windows = self.windows.lock().await;
        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, limiter| !limiter.is_idle());
        }

        let limiter = windows
            .entry(ip.to_string())
            .or_insert_with(|| RateLimiter::new(self.config.max_requests, self.config.window()));

        if limiter.check() {
            return Ok(());
        }

        let wait = limiter.reset_in().unwrap_or_else(|| self.config.window());
        // Round up so clients never retry early
        Err(wait.as_secs() + u64::from(wait.subsec_nanos() > 0))
    }
}

/// Reject requests from IPs that exceeded their window budget
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    if let Err(retry_after) = state.rate_limiter.check(&ip).await {
        tracing::warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        metrics::http_rate_limited();
        return Err(AuthError::RateLimited { retry_after }.into());
    }

    Ok(next.run(request).await)
}
