use once_cell::sync::{Lazy, OnceCell};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::cipher::Cipher;
use crate::client::endpoint::EndpointResolver;
use crate::client::options::RequestOptions;
use crate::client::types::ApiResult;
use crate::config::ClientConfig;
use crate::interceptors::InterceptorPipeline;
use crate::resilience::retry::RetryEngine;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};

/// Lifecycle of an [`ApiClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Configured,
}

/// Everything resolved once at configure time.
pub(crate) struct Configured {
    pub(crate) config: ClientConfig,
    pub(crate) resolver: EndpointResolver,
    pub(crate) cipher: Option<Cipher>,
    pub(crate) pipeline: InterceptorPipeline,
    pub(crate) engine: RetryEngine,
}

/// Uniform client for the versioned upstream APIs.
///
/// Configure exactly once, then call the verb methods from anywhere.
///
/// ```rust,no_run
/// use upstream_client::{ApiClient, ClientConfig, RequestOptions};
///
/// # async fn run() -> upstream_client::Result<()> {
/// let client = ApiClient::new();
/// client.configure(
///     ClientConfig::builder()
///         .endpoint_url_pattern("https://api.example.com/{version}/{path}")
///         .endpoint("", "v1")
///         .endpoint("orders", "v2")
///         .build()?,
/// )?;
///
/// let order = client
///     .get::<serde_json::Value>("orders/42", RequestOptions::new().optional(true))
///     .await?;
/// println!("{:?}", order.body());
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    state: OnceCell<Configured>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("state", &self.state())
            .finish()
    }
}

impl ApiClient {
    pub const fn new() -> Self {
        Self {
            state: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        if self.state.get().is_some() {
            ClientState::Configured
        } else {
            ClientState::Uninitialized
        }
    }

    pub fn is_configured(&self) -> bool {
        self.state() == ClientState::Configured
    }

    /// Configure with the default pooled [`HttpTransport`].
    pub fn configure(&self, config: ClientConfig) -> Result<()> {
        self.configure_with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Configure with any transport. Interceptor factories run here, once.
    pub fn configure_with_transport(
        &self,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<()> {
        if self.is_configured() {
            return Err(already_configured());
        }

        let cipher = config
            .cipher_alphabet
            .as_deref()
            .map(Cipher::new)
            .transpose()?;
        let resolver = EndpointResolver::new(config.endpoint_settings.clone(), cipher.is_some());
        let pipeline = InterceptorPipeline::from_config(&config)?;

        info!(
            endpoints = config.endpoint_settings.len(),
            interceptors = pipeline.len(),
            obfuscation = cipher.is_some(),
            "upstream client configured"
        );

        self.state
            .set(Configured {
                config,
                resolver,
                cipher,
                pipeline,
                engine: RetryEngine::new(transport),
            })
            .map_err(|_| already_configured())
    }

    /// The configuration in effect.
    pub fn config(&self) -> Result<&ClientConfig> {
        Ok(&self.configured()?.config)
    }

    pub(crate) fn configured(&self) -> Result<&Configured> {
        self.state.get().ok_or_else(|| {
            Error::lifecycle("upstream client used before configure() was called")
        })
    }

    pub async fn head<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::HEAD, path.into(), options).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::GET, path.into(), options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::PUT, path.into(), options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::POST, path.into(), options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::PATCH, path.into(), options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(Method::DELETE, path.into(), options).await
    }

    /// Issue a call with any method. HEAD, GET and DELETE refuse a body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: impl Into<ApiPath>,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        self.call(method, path.into(), options).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: ApiPath,
        mut options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        let configured = self.configured()?;

        if options.body.is_some()
            && matches!(method, Method::HEAD | Method::GET | Method::DELETE)
        {
            return Err(Error::validation_with_context(
                format!("{method} requests cannot carry a body"),
                ErrorContext::new()
                    .with_field_path("body")
                    .with_source("api_client"),
            ));
        }

        // Retry is opt-in per call: the verbs seed 0 over the library default.
        if options.settings.retry_count.is_none() {
            options.settings.retry_count = Some(0);
        }

        configured.execute(method, path.as_str(), options).await
    }
}

fn already_configured() -> Error {
    Error::lifecycle("upstream client is already configured")
}

static GLOBAL: Lazy<ApiClient> = Lazy::new(ApiClient::new);

/// Process-wide client, for applications that configure once at startup.
pub fn global() -> &'static ApiClient {
    &GLOBAL
}

/// Logical request path: a string (leading `/` ignored) or a list of raw segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath(String);

impl ApiPath {
    /// Join raw segments, percent-encoding each one.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| urlencoding::encode(s.as_ref()).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        ApiPath(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApiPath {
    fn from(path: &str) -> Self {
        ApiPath(path.trim_start_matches('/').to_string())
    }
}

impl From<String> for ApiPath {
    fn from(path: String) -> Self {
        ApiPath::from(path.as_str())
    }
}

impl From<&String> for ApiPath {
    fn from(path: &String) -> Self {
        ApiPath::from(path.as_str())
    }
}

impl From<&[&str]> for ApiPath {
    fn from(segments: &[&str]) -> Self {
        ApiPath::from_segments(segments)
    }
}

impl<const N: usize> From<[&str; N]> for ApiPath {
    fn from(segments: [&str; N]) -> Self {
        ApiPath::from_segments(segments)
    }
}

impl From<Vec<String>> for ApiPath {
    fn from(segments: Vec<String>) -> Self {
        ApiPath::from_segments(segments)
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
