//! Interceptor hooks around the transport.
//!
//! An interceptor may rewrite the outgoing request, answer it without touching
//! the network (return a response from `on_request`), or turn a response back
//! into a fresh request (return a request from `on_response`), which restarts
//! the whole request phase.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::client::options::CallOptions;
use crate::client::types::{ApiRequest, ApiResponse, Exchange};
use crate::config::ClientConfig;
use crate::Result;

pub mod headers;
pub mod stub;

pub use headers::{AmbientContext, ContextSource, HeaderPropagationInterceptor, StaticContext};
pub use stub::{ResponseStubInterceptor, StubBody, StubEntry, StubOutcome, StubResponse};

/// Request/response transformation hooks. Both hooks pass through by default.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn on_request(
        &self,
        request: ApiRequest,
        _options: &CallOptions,
        _config: &ClientConfig,
    ) -> Result<Exchange> {
        Ok(Exchange::Request(request))
    }

    async fn on_response(
        &self,
        response: ApiResponse,
        _options: &CallOptions,
        _config: &ClientConfig,
    ) -> Result<Exchange> {
        Ok(Exchange::Response(response))
    }
}

/// Builds an interceptor once, when the client is configured.
pub type InterceptorFactory =
    Arc<dyn Fn(&ClientConfig) -> Result<Arc<dyn Interceptor>> + Send + Sync>;

/// A configured interceptor: a ready instance or a factory.
#[derive(Clone)]
pub enum InterceptorSource {
    Instance(Arc<dyn Interceptor>),
    Factory(InterceptorFactory),
}

impl InterceptorSource {
    pub fn resolve(&self, config: &ClientConfig) -> Result<Arc<dyn Interceptor>> {
        match self {
            InterceptorSource::Instance(i) => Ok(Arc::clone(i)),
            InterceptorSource::Factory(f) => f(config),
        }
    }
}

impl fmt::Debug for InterceptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorSource::Instance(_) => f.write_str("InterceptorSource::Instance(..)"),
            InterceptorSource::Factory(_) => f.write_str("InterceptorSource::Factory(..)"),
        }
    }
}

/// Ordered interceptors, resolved once per configuration.
#[derive(Clone, Default)]
pub struct InterceptorPipeline {
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Resolve every source against the configuration, preserving order.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let interceptors = config
            .interceptors
            .iter()
            .map(|source| source.resolve(config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { interceptors })
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Drive `request` through the hooks, calling `send` whenever a request
    /// survives the request phase.
    pub async fn execute<F, Fut>(
        &self,
        request: ApiRequest,
        options: &CallOptions,
        config: &ClientConfig,
        send: F,
    ) -> Result<ApiResponse>
    where
        F: Fn(ApiRequest) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let mut request = request;
        let mut pass: u32 = 0;
        loop {
            pass += 1;
            let response = match self.request_phase(request, options, config).await? {
                Exchange::Request(req) => send(req).await?,
                Exchange::Response(resp) => {
                    debug!(pass, "request answered by interceptor");
                    resp
                }
            };

            match self.response_phase(response, options, config).await? {
                Exchange::Response(resp) => return Ok(resp),
                Exchange::Request(next) => {
                    debug!(pass, url = %next.url, "interceptor restarted the request");
                    request = next;
                }
            }
        }
    }

    async fn request_phase(
        &self,
        mut request: ApiRequest,
        options: &CallOptions,
        config: &ClientConfig,
    ) -> Result<Exchange> {
        for ic in &self.interceptors {
            match ic.on_request(request, options, config).await? {
                Exchange::Request(next) => request = next,
                response @ Exchange::Response(_) => return Ok(response),
            }
        }
        Ok(Exchange::Request(request))
    }

    async fn response_phase(
        &self,
        mut response: ApiResponse,
        options: &CallOptions,
        config: &ClientConfig,
    ) -> Result<Exchange> {
        for ic in &self.interceptors {
            match ic.on_response(response, options, config).await? {
                Exchange::Response(next) => response = next,
                request @ Exchange::Request(_) => return Ok(request),
            }
        }
        Ok(Exchange::Response(response))
    }
}
