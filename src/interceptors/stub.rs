//! Canned responses for development and tests.
//!
//! Stubs are keyed by `"METHOD /path"` or `"METHOD //host/path"`; a host-qualified
//! key wins over a path-only key. Every served stub logs a warning so it is never
//! mistaken for real upstream traffic.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

use super::Interceptor;
use crate::client::options::CallOptions;
use crate::client::types::{ApiRequest, ApiResponse, Exchange};
use crate::codec::is_json_media_type;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::resilience::sleep_or_cancel;
use crate::{Error, ErrorContext, Result};

const KEY_PATTERN: &str = r"^[A-Z]+ //?";

/// Stub body: plain text, or a JSON value serialized on use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StubBody {
    Text(String),
    Json(serde_json::Value),
}

/// Static stub descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StubResponse {
    /// Defaults to 200.
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<StubBody>,
    /// Extra latency in milliseconds on top of the interceptor's latency.
    pub delay: u64,
}

impl StubResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(StubBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(StubBody::Text(body.into()));
        self
    }

    pub fn delay_ms(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }
}

/// What a stub function decides for a request.
#[derive(Debug, Clone)]
pub enum StubOutcome {
    Stub(StubResponse),
    /// Replace the request; it continues through the pipeline.
    Request(ApiRequest),
    /// Answer verbatim.
    Response(ApiResponse),
}

pub type StubFn =
    Arc<dyn Fn(&Method, &Url, &CallOptions) -> Option<StubOutcome> + Send + Sync>;

#[derive(Clone)]
pub enum StubEntry {
    Static(StubResponse),
    /// Returning `None` lets the request through untouched.
    Dynamic(StubFn),
}

impl StubEntry {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Method, &Url, &CallOptions) -> Option<StubOutcome> + Send + Sync + 'static,
    {
        StubEntry::Dynamic(Arc::new(f))
    }
}

impl From<StubResponse> for StubEntry {
    fn from(stub: StubResponse) -> Self {
        StubEntry::Static(stub)
    }
}

impl fmt::Debug for StubEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubEntry::Static(s) => f.debug_tuple("Static").field(s).finish(),
            StubEntry::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// `on_request` interceptor that answers matching requests with stubs.
#[derive(Debug)]
pub struct ResponseStubInterceptor {
    stubs: HashMap<String, StubEntry>,
    latency: Duration,
}

impl ResponseStubInterceptor {
    /// Register stubs. In debug builds malformed keys are rejected.
    pub fn new<I, K>(stubs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, StubEntry)>,
        K: Into<String>,
    {
        let stubs: HashMap<String, StubEntry> =
            stubs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if cfg!(debug_assertions) {
            validate_keys(stubs.keys())?;
        }
        Ok(Self {
            stubs,
            latency: Duration::ZERO,
        })
    }

    /// Load a YAML map of static stub descriptors.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let stubs: BTreeMap<String, StubResponse> = serde_yaml::from_str(content)?;
        Self::new(stubs.into_iter().map(|(k, v)| (k, StubEntry::Static(v))))
    }

    /// Base latency added to every stub.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lookup(&self, method: &Method, url: &Url) -> Option<&StubEntry> {
        let path = url.path();
        let host_key = url.host_str().map(|host| match url.port() {
            Some(port) => format!("{method} //{host}:{port}{path}"),
            None => format!("{method} //{host}{path}"),
        });
        host_key
            .and_then(|k| self.stubs.get(&k))
            .or_else(|| self.stubs.get(&format!("{method} {path}")))
    }

    fn synthesize(&self, request: &ApiRequest, stub: StubResponse) -> Result<ApiResponse> {
        let status = StatusCode::from_u16(stub.status.unwrap_or(200)).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid stub status: {e}"),
                ErrorContext::new().with_source("response_stub"),
            )
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &stub.headers {
            let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes());
            let value = HeaderValue::from_str(value);
            match (name, value) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => {
                    return Err(Error::configuration_with_context(
                        "invalid stub header",
                        ErrorContext::new().with_source("response_stub"),
                    ))
                }
            }
        }

        let mut response = ApiResponse::new(status, request.url.clone());
        if let Some(body) = stub.body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let json = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(is_json_media_type)
                .unwrap_or(false);
            let text = match body {
                StubBody::Text(t) => t,
                StubBody::Json(serde_json::Value::String(s)) if !json => s,
                StubBody::Json(v) => serde_json::to_string(&v)?,
            };
            response = response.with_body(text);
        }
        response.headers = headers;
        if let Some(text) = stub.status_text {
            response = response.with_status_text(text);
        }
        Ok(response)
    }
}

fn validate_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Result<()> {
    let re = Regex::new(KEY_PATTERN).map_err(|e| {
        Error::configuration_with_context(
            format!("stub key pattern failed to compile: {e}"),
            ErrorContext::new().with_source("response_stub"),
        )
    })?;
    for key in keys {
        if !re.is_match(key) {
            return Err(Error::configuration_with_context(
                format!("malformed stub key '{key}'"),
                ErrorContext::new()
                    .with_details("expected \"METHOD /path\" or \"METHOD //host/path\"")
                    .with_source("response_stub"),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl Interceptor for ResponseStubInterceptor {
    async fn on_request(
        &self,
        request: ApiRequest,
        options: &CallOptions,
        _config: &ClientConfig,
    ) -> Result<Exchange> {
        let Some(entry) = self.lookup(&request.method, &request.url) else {
            return Ok(Exchange::Request(request));
        };

        let stub = match entry {
            StubEntry::Static(stub) => stub.clone(),
            StubEntry::Dynamic(f) => match f(&request.method, &request.url, options) {
                None => return Ok(Exchange::Request(request)),
                Some(StubOutcome::Stub(stub)) => stub,
                Some(StubOutcome::Request(replacement)) => {
                    warn!(method = %request.method, url = %request.url, "stub replaced request");
                    return Ok(Exchange::Request(replacement));
                }
                Some(StubOutcome::Response(response)) => {
                    warn!(method = %request.method, url = %request.url, "serving stubbed response verbatim");
                    return Ok(Exchange::Response(response));
                }
            },
        };

        let wait = self.latency + Duration::from_millis(stub.delay);
        if !sleep_or_cancel(wait, request.cancel.as_ref()).await {
            return Err(ApiError::abort(request).into());
        }

        warn!(
            method = %request.method,
            url = %request.url,
            status = stub.status.unwrap_or(200),
            "serving stubbed response"
        );
        let response = self.synthesize(&request, stub)?;
        Ok(Exchange::Response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::options::{RequestOptions, RequestSettings};
    use crate::error::ApiErrorKind;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

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

    fn get(url: &str) -> ApiRequest {
        ApiRequest::new(Method::GET, Url::parse(url).unwrap())
    }

    async fn run(ic: &ResponseStubInterceptor, req: ApiRequest) -> Result<Exchange> {
        ic.on_request(req, &options(), &config()).await
    }

    #[test]
    fn test_malformed_keys_rejected() {
        let err = ResponseStubInterceptor::new(vec![(
            "get /v1/orders",
            StubEntry::Static(StubResponse::new()),
        )])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(ResponseStubInterceptor::new(vec![(
            "GET v1/orders",
            StubEntry::Static(StubResponse::new())
        )])
        .is_err());
    }

    #[tokio::test]
    async fn test_unmatched_request_passes_through() {
        let ic = ResponseStubInterceptor::new(vec![(
            "GET /v1/orders",
            StubEntry::from(StubResponse::new()),
        )])
        .unwrap();
        let out = run(&ic, get("https://api.example.com/v1/routes")).await.unwrap();
        assert!(matches!(out, Exchange::Request(_)));
        let post = ApiRequest::new(
            Method::POST,
            Url::parse("https://api.example.com/v1/orders").unwrap(),
        );
        assert!(matches!(run(&ic, post).await.unwrap(), Exchange::Request(_)));
    }

    #[tokio::test]
    async fn test_static_stub_defaults() {
        let ic = ResponseStubInterceptor::new(vec![(
            "GET /v1/orders/1",
            StubEntry::from(StubResponse::new().json(json!({"id": 1}))),
        )])
        .unwrap();
        let Exchange::Response(resp) =
            run(&ic, get("https://api.example.com/v1/orders/1?x=1")).await.unwrap()
        else {
            panic!("expected a stubbed response");
        };
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers[CONTENT_TYPE], "application/json");
        assert_eq!(resp.text(), r#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_host_key_wins_over_path_key() {
        let ic = ResponseStubInterceptor::new(vec![
            ("GET /v1/x", StubEntry::from(StubResponse::new().status(201))),
            (
                "GET //api.example.com/v1/x",
                StubEntry::from(StubResponse::new().status(202)),
            ),
        ])
        .unwrap();
        let Exchange::Response(resp) = run(&ic, get("https://api.example.com/v1/x")).await.unwrap()
        else {
            panic!("expected a stubbed response");
        };
        assert_eq!(resp.status.as_u16(), 202);
        let Exchange::Response(other) = run(&ic, get("https://other.example.com/v1/x")).await.unwrap()
        else {
            panic!("expected a stubbed response");
        };
        assert_eq!(other.status.as_u16(), 201);
    }

    #[tokio::test]
    async fn test_text_body_keeps_explicit_content_type() {
        let ic = ResponseStubInterceptor::new(vec![(
            "GET /v1/health",
            StubEntry::from(
                StubResponse::new()
                    .header("Content-Type", "text/plain")
                    .text("ok"),
            ),
        )])
        .unwrap();
        let Exchange::Response(resp) = run(&ic, get("https://api.example.com/v1/health")).await.unwrap()
        else {
            panic!("expected a stubbed response");
        };
        assert_eq!(resp.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(resp.text(), "ok");
    }

    #[tokio::test]
    async fn test_dynamic_stub_outcomes() {
        let ic = ResponseStubInterceptor::new(vec![(
            "DELETE /v1/orders/7",
            StubEntry::dynamic(|_method, url, _opts| {
                if url.query() == Some("soft=1") {
                    None
                } else {
                    Some(StubOutcome::Response(ApiResponse::new(
                        StatusCode::NO_CONTENT,
                        url.clone(),
                    )))
                }
            }),
        )])
        .unwrap();
        let del = |u: &str| ApiRequest::new(Method::DELETE, Url::parse(u).unwrap());
        let Exchange::Response(resp) = run(&ic, del("https://api.example.com/v1/orders/7"))
            .await
            .unwrap()
        else {
            panic!("expected a verbatim response");
        };
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
        assert!(matches!(
            run(&ic, del("https://api.example.com/v1/orders/7?soft=1")).await.unwrap(),
            Exchange::Request(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let ic = ResponseStubInterceptor::new(vec![(
            "GET /v1/slow",
            StubEntry::from(StubResponse::new().delay_ms(250)),
        )])
        .unwrap()
        .with_latency(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        run(&ic, get("https://api.example.com/v1/slow")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_cancelled_request_aborts_during_latency() {
        let token = CancellationToken::new();
        token.cancel();
        let ic = ResponseStubInterceptor::new(vec![(
            "GET /v1/slow",
            StubEntry::from(StubResponse::new().delay_ms(10_000)),
        )])
        .unwrap();
        let req = get("https://api.example.com/v1/slow").with_cancel(token);
        let err = run(&ic, req).await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Abort));
    }

    #[test]
    fn test_yaml_stubs() {
        let ic = ResponseStubInterceptor::from_yaml_str(
            r#"
"GET /v1/orders":
  status: 200
  body:
    items: []
"POST //api.example.com/v1/orders":
  status: 201
  body: created
"#,
        )
        .unwrap();
        assert_eq!(ic.stubs.len(), 2);
        let Some(StubEntry::Static(stub)) = ic.stubs.get("POST //api.example.com/v1/orders")
        else {
            panic!("missing stub");
        };
        assert_eq!(stub.body, Some(StubBody::Text("created".into())));
    }
}
