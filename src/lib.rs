//! # upstream-client
//!
//! Resilient, pluggable HTTP client core for calling a family of versioned upstream APIs
//! through one uniform interface.
//!
//! ## Overview
//!
//! A call flows through a fixed set of stages:
//!
//! 1. **Endpoint resolution**: the longest registered path prefix picks the API version
//!    and whether the call is obfuscated.
//! 2. **Request building**: layered defaults, URL templating, deterministic query encoding,
//!    JSON bodies, optional obfuscation.
//! 3. **Interceptor pipeline**: ordered request/response hooks that may answer a request
//!    without the network or restart the call with a fresh request.
//! 4. **Retry engine**: resends transient failures (502/503/504 and transport errors) on a
//!    cancellable backoff schedule.
//! 5. **Decoding and classification**: content-type sniffing, deobfuscation, legacy envelope
//!    handling, and a typed error taxonomy ([`ApiErrorKind`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upstream_client::{global, ClientConfig, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> upstream_client::Result<()> {
//!     global().configure(
//!         ClientConfig::builder()
//!             .endpoint_url_pattern("https://api.example.com/{version}/{path}")
//!             .endpoint("", "v1")
//!             .build()?,
//!     )?;
//!
//!     let routes = global()
//!         .get::<serde_json::Value>("routes", RequestOptions::new().query("limit", 10))
//!         .await?;
//!     println!("{:?}", routes.body());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client lifecycle, call verbs, options, endpoint resolution |
//! | [`config`] | Configuration values and YAML/JSON documents |
//! | [`codec`] | Query-string and JSON body codecs |
//! | [`cipher`] | Reversible substitution cipher over base64url |
//! | [`interceptors`] | Interceptor trait, pipeline, header propagation, response stubs |
//! | [`resilience`] | Retry engine and cancellable waits |
//! | [`transport`] | Transport trait and the pooled `reqwest` transport |

pub mod cipher;
pub mod client;
pub mod codec;
pub mod config;
pub mod interceptors;
pub mod resilience;
pub mod transport;

// Re-export main types for convenience
pub use client::{
    global, ApiClient, ApiPath, ApiRequest, ApiResponse, ApiResult, CallOptions,
    ClientConfigBuilder, ClientState, EndpointSettings, Exchange, RedirectMode, RequestOptions,
    RequestSettings,
};
pub use codec::{QueryValue, RequestBody, Reviver};
pub use config::{ClientConfig, ClientSettings};
pub use interceptors::{Interceptor, InterceptorSource};
pub use transport::{HttpTransport, Transport, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{ApiError, ApiErrorKind, Error, ErrorContext};
