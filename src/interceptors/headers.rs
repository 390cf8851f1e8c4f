//! Copies ambient call context (correlation id, locale, currency) onto outgoing headers.
//!
//! A header the caller already set is never overwritten.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::future::Future;
use std::sync::Arc;

use super::Interceptor;
use crate::client::options::CallOptions;
use crate::client::types::{ApiRequest, Exchange};
use crate::config::ClientConfig;
use crate::{Error, ErrorContext, Result};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const LOCALE_HEADER: &str = "accept-language";
pub const CURRENCY_HEADER: &str = "x-currency";

/// Where contextual values come from.
pub trait ContextSource: Send + Sync {
    fn correlation_id(&self) -> Option<String>;
    fn locale(&self) -> Option<String>;
    fn currency(&self) -> Option<String>;
}

/// Fixed context values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticContext {
    pub correlation_id: Option<String>,
    pub locale: Option<String>,
    pub currency: Option<String>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

impl ContextSource for StaticContext {
    fn correlation_id(&self) -> Option<String> {
        self.correlation_id.clone()
    }

    fn locale(&self) -> Option<String> {
        self.locale.clone()
    }

    fn currency(&self) -> Option<String> {
        self.currency.clone()
    }
}

tokio::task_local! {
    static CALL_CONTEXT: StaticContext;
}

/// Reads the context installed for the current task with [`AmbientContext::scope`].
///
/// Outside a scope every value is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientContext;

impl AmbientContext {
    /// Run `fut` with `ctx` visible to every call it makes.
    pub async fn scope<F>(ctx: StaticContext, fut: F) -> F::Output
    where
        F: Future,
    {
        CALL_CONTEXT.scope(ctx, fut).await
    }

    fn read<T>(f: impl FnOnce(&StaticContext) -> Option<T>) -> Option<T> {
        CALL_CONTEXT.try_with(f).ok().flatten()
    }
}

impl ContextSource for AmbientContext {
    fn correlation_id(&self) -> Option<String> {
        Self::read(|c| c.correlation_id.clone())
    }

    fn locale(&self) -> Option<String> {
        Self::read(|c| c.locale.clone())
    }

    fn currency(&self) -> Option<String> {
        Self::read(|c| c.currency.clone())
    }
}

/// `on_request`-only interceptor that fills in context headers.
pub struct HeaderPropagationInterceptor {
    source: Arc<dyn ContextSource>,
    correlation_header: HeaderName,
    locale_header: HeaderName,
    currency_header: HeaderName,
}

impl HeaderPropagationInterceptor {
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self {
            source,
            correlation_header: HeaderName::from_static(CORRELATION_ID_HEADER),
            locale_header: HeaderName::from_static(LOCALE_HEADER),
            currency_header: HeaderName::from_static(CURRENCY_HEADER),
        }
    }

    /// Propagate from the task-local [`AmbientContext`].
    pub fn ambient() -> Self {
        Self::new(Arc::new(AmbientContext))
    }

    /// Override the header names, e.g. for an upstream expecting `x-request-id`.
    pub fn with_header_names(
        mut self,
        correlation: &str,
        locale: &str,
        currency: &str,
    ) -> Result<Self> {
        self.correlation_header = header_name(correlation)?;
        self.locale_header = header_name(locale)?;
        self.currency_header = header_name(currency)?;
        Ok(self)
    }

    fn fill(request: &mut ApiRequest, name: &HeaderName, value: Option<String>) {
        if request.headers.contains_key(name) {
            return;
        }
        let Some(value) = value else { return };
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                request.headers.insert(name.clone(), v);
            }
            Err(_) => tracing::warn!(header = %name, "skipping context value that is not a valid header"),
        }
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid header name '{name}': {e}"),
            ErrorContext::new().with_source("header_propagation"),
        )
    })
}

#[async_trait]
impl Interceptor for HeaderPropagationInterceptor {
    async fn on_request(
        &self,
        mut request: ApiRequest,
        _options: &CallOptions,
        _config: &ClientConfig,
    ) -> Result<Exchange> {
        Self::fill(
            &mut request,
            &self.correlation_header,
            self.source.correlation_id(),
        );
        Self::fill(&mut request, &self.locale_header, self.source.locale());
        Self::fill(&mut request, &self.currency_header, self.source.currency());
        Ok(Exchange::Request(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::options::{RequestOptions, RequestSettings};
    use reqwest::Method;

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .endpoint_url_pattern("https://api.example.com/{version}/{path}")
            .endpoint("", "v1")
            .build()
            .unwrap()
    }

    fn options() -> CallOptions {
        CallOptions::resolve(&RequestSettings::default(), RequestOptions::new())
    }

    fn request() -> ApiRequest {
        ApiRequest::new(
            Method::GET,
            url::Url::parse("https://api.example.com/v1/orders").unwrap(),
        )
    }

    async fn run(ic: &HeaderPropagationInterceptor, req: ApiRequest) -> ApiRequest {
        match ic.on_request(req, &options(), &config()).await.unwrap() {
            Exchange::Request(r) => r,
            Exchange::Response(_) => panic!("propagation must not answer requests"),
        }
    }

    #[tokio::test]
    async fn test_fills_missing_headers() {
        let ic = HeaderPropagationInterceptor::new(Arc::new(
            StaticContext::new()
                .with_correlation_id("abc-123")
                .with_locale("de-CH")
                .with_currency("CHF"),
        ));
        let out = run(&ic, request()).await;
        assert_eq!(out.headers["x-correlation-id"], "abc-123");
        assert_eq!(out.headers["accept-language"], "de-CH");
        assert_eq!(out.headers["x-currency"], "CHF");
    }

    #[tokio::test]
    async fn test_explicit_header_wins() {
        let ic = HeaderPropagationInterceptor::new(Arc::new(
            StaticContext::new().with_locale("de-CH"),
        ));
        let req = request().with_header(
            HeaderName::from_static("accept-language"),
            HeaderValue::from_static("fr-FR"),
        );
        let out = run(&ic, req).await;
        assert_eq!(out.headers["accept-language"], "fr-FR");
        assert!(!out.headers.contains_key("x-currency"));
    }

    #[tokio::test]
    async fn test_ambient_context_is_task_scoped() {
        let ic = HeaderPropagationInterceptor::ambient();
        let outside = run(&ic, request()).await;
        assert!(!outside.headers.contains_key("x-correlation-id"));

        let inside = AmbientContext::scope(
            StaticContext::new().with_correlation_id("scoped"),
            run(&ic, request()),
        )
        .await;
        assert_eq!(inside.headers["x-correlation-id"], "scoped");
    }

    #[tokio::test]
    async fn test_custom_header_names() {
        let ic = HeaderPropagationInterceptor::new(Arc::new(
            StaticContext::new().with_correlation_id("r-1"),
        ))
        .with_header_names("X-Request-Id", "content-language", "x-ccy")
        .unwrap();
        let out = run(&ic, request()).await;
        assert_eq!(out.headers["x-request-id"], "r-1");
    }
}
