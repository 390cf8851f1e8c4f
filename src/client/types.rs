//! Request/response values exchanged between the builder, interceptors, transport and decoder.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::options::RedirectMode;

/// One fully built outbound request.
///
/// The body is buffered in `Bytes`, so cloning for a resend is a refcount bump.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub redirect: RedirectMode,
    pub keep_alive: bool,
    pub cancel: Option<CancellationToken>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            redirect: RedirectMode::default(),
            keep_alive: true,
            cancel: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let media = raw.split(';').next().unwrap_or_default().trim();
        if media.is_empty() {
            None
        } else {
            Some(media.to_ascii_lowercase())
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What an interceptor hands back: keep going with a request, or answer with a response.
#[derive(Debug, Clone)]
pub enum Exchange {
    Request(ApiRequest),
    Response(ApiResponse),
}

impl From<ApiRequest> for Exchange {
    fn from(request: ApiRequest) -> Self {
        Exchange::Request(request)
    }
}

impl From<ApiResponse> for Exchange {
    fn from(response: ApiResponse) -> Self {
        Exchange::Response(response)
    }
}

/// Outcome of one successfully classified exchange.
#[derive(Debug, Clone)]
pub struct ApiResult<T> {
    request: ApiRequest,
    response: ApiResponse,
    body: Option<T>,
}

impl<T> ApiResult<T> {
    pub(crate) fn new(request: ApiRequest, response: ApiResponse, body: Option<T>) -> Self {
        Self {
            request,
            response,
            body,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn response(&self) -> &ApiResponse {
        &self.response
    }

    /// Decoded body; `None` for empty, non-JSON, or undeserialized bodies.
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    pub fn into_body(self) -> Option<T> {
        self.body
    }

    pub fn into_parts(self) -> (ApiRequest, ApiResponse, Option<T>) {
        (self.request, self.response, self.body)
    }
}
