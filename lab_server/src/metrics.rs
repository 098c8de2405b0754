//! Prometheus metrics for the authentication service.
//!
//! Counters are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the Prometheus exporter.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lab_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::login_attempt(metrics::LoginOutcome::Success);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Errors
///
/// Returns a message if the exporter cannot bind or is already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Result label for `auth_login_attempts_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failure,
    Locked,
    TwoFactorRequired,
}

impl LoginOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Locked => "locked",
            Self::TwoFactorRequired => "2fa_required",
        }
    }
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Increments the total HTTP request counter with method and status labels.
pub fn http_requests_total(method: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Request rejected by the per-IP limiter.
pub fn http_rate_limited() {
    metrics::counter!("http_rate_limited_total").increment(1);
}

// ============================================================================
// Auth Metrics
// ============================================================================

pub fn login_attempt(outcome: LoginOutcome) {
    metrics::counter!("auth_login_attempts_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Login rejected by a lockout. `scope` names the guard: `ip`, `identifier` or `account`.
pub fn lockout(scope: &str) {
    metrics::counter!("auth_lockouts_total",
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// One access and one refresh token were issued.
pub fn token_pair_issued() {
    metrics::counter!("auth_tokens_issued_total", "type" => "access").increment(1);
    metrics::counter!("auth_tokens_issued_total", "type" => "refresh").increment(1);
}

pub fn tokens_revoked(count: u64) {
    metrics::counter!("auth_tokens_revoked_total").increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_without_recorder() {
        // No exporter installed; recording must be a no-op
        http_requests_total("GET", 200);
        http_rate_limited();
        login_attempt(LoginOutcome::Locked);
        lockout("ip");
        token_pair_issued();
        tokens_revoked(3);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(LoginOutcome::Success.as_str(), "success");
        assert_eq!(LoginOutcome::TwoFactorRequired.as_str(), "2fa_required");
    }
}
