//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients (Stripe, Resend) are built here rather than with
//! `reqwest::Client::new()`.

use reqwest::Client;
use std::time::Duration;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request/response time.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client with default timeouts, falling back to an
/// unconfigured client if the builder fails.
pub fn build_client() -> Client {
    try_build_client().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client with timeouts, using defaults");
        Client::new()
    })
}

pub fn try_build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
}
