//! HTTP authentication service for Labitory.
//!
//! Exposes the login flow and token lifecycle of the [`labitory`] crate over
//! an axum router, with a per-IP request limiter on the authentication
//! routes, request ids on every response and Prometheus counters.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
