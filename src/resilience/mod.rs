//! Resilience primitives: the retry engine and cancellable waits.
//!
//! ## Retry engine
//!
//! [`retry::RetryEngine`] sends one request up to `retry_count + 1` times,
//! retrying only transient outcomes (HTTP 502/503/504 and transport failures
//! without a permanent marker), waiting between attempts per the caller's delay
//! schedule. A fired cancellation token ends the call immediately with an abort.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use upstream_client::resilience::retry::RetryEngine;
//! use upstream_client::transport::HttpTransport;
//!
//! let engine = RetryEngine::new(Arc::new(HttpTransport::new()));
//! ```

pub mod retry;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Resolves when `token` fires; never resolves without a token.
pub(crate) async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn sleep_or_cancel(delay: Duration, token: Option<&CancellationToken>) -> bool {
    if token.map(|t| t.is_cancelled()).unwrap_or(false) {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancelled(token) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
