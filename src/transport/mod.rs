//! Wire transport behind the retry engine.

pub mod http;

use async_trait::async_trait;

use crate::client::types::{ApiRequest, ApiResponse};

pub use http::{HttpTransport, PoolSettings, TransportPool};

/// Sends one attempt and buffers the full response.
///
/// Implementations must not retry; the engine owns retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),

    /// Failure that a resend cannot fix.
    #[error("Permanent transport error: {0}")]
    Permanent(String),
}

impl TransportError {
    /// Everything is transient unless explicitly marked otherwise.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => !(e.is_builder() || e.is_redirect()),
            TransportError::Other(_) => true,
            TransportError::Permanent(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_marker() {
        assert!(TransportError::Other("connection reset".into()).is_transient());
        assert!(!TransportError::Permanent("bad certificate".into()).is_transient());
    }
}
