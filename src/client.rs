//! Uniform call surface for the versioned upstream APIs.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod decode;
pub mod endpoint;
pub(crate) mod error_classification;
mod execution;
pub mod options;
pub(crate) mod policy;
mod request;
pub mod types;

pub use builder::ClientConfigBuilder;
pub use core::{global, ApiClient, ApiPath, ClientState};
pub use endpoint::{EndpointResolver, EndpointSettings, ResolvedEndpoint};
pub use options::{
    CallOptions, RedirectMode, RequestOptions, RequestSettings, DEFAULT_RETRY_COUNT,
    DEFAULT_RETRY_DELAYS_MS,
};
pub use types::{ApiRequest, ApiResponse, ApiResult, Exchange};
