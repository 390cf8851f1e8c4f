use crate::client::types::{ApiRequest, ApiResponse};
use std::fmt;
use thiserror::Error;

/// Structured error context for configuration and codec failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "endpoint_settings.orders", "cipher_alphabet")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected shape, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "endpoint_resolver", "request_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Which member of the call-failure taxonomy an [`ApiError`] is.
///
/// Downstream HTTP error middleware dispatches on this value to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Generic failure: non-ok response without a problem document, transport failure, undecodable body.
    Api,
    /// The origin answered with an RFC 7807 `application/problem+json` document.
    ApiOrigin,
    /// A problem document carrying structured field errors.
    ApiValidation,
    /// The legacy upstream signalled failure through its in-body status convention.
    NoiApiOrigin,
    /// The call was cancelled by its cancellation token.
    Abort,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Api => "api_error",
            ApiErrorKind::ApiOrigin => "api_origin_error",
            ApiErrorKind::ApiValidation => "api_validation_error",
            ApiErrorKind::NoiApiOrigin => "noi_api_origin_error",
            ApiErrorKind::Abort => "api_abort_error",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an issued upstream call.
///
/// `transient`, `response` and `data` are the contract consumed by HTTP error
/// mapping layers; keep them populated consistently across kinds.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub transient: bool,
    pub message: String,
    pub request: ApiRequest,
    pub response: Option<ApiResponse>,
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>, request: ApiRequest) -> Self {
        Self {
            kind,
            transient: false,
            message: message.into(),
            request,
            response: None,
            data: None,
        }
    }

    pub fn abort(request: ApiRequest) -> Self {
        Self::new(ApiErrorKind::Abort, "request aborted", request)
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn with_response(mut self, response: ApiResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status.as_u16())
    }

    /// Status hidden in a legacy upstream envelope (`{"status": 404, ...}`).
    pub fn embedded_status(&self) -> Option<u16> {
        self.data
            .as_ref()
            .and_then(|d| d.get("status"))
            .and_then(crate::client::error_classification::status_code)
            .and_then(|s| u16::try_from(s).ok())
    }

    /// Structured field errors of a validation problem document.
    pub fn field_errors(&self) -> Option<&serde_json::Value> {
        if self.kind != ApiErrorKind::ApiValidation {
            return None;
        }
        self.data.as_ref().and_then(|d| d.get("errors"))
    }

    pub fn is_abort(&self) -> bool {
        self.kind == ApiErrorKind::Abort
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.kind, self.request.method, self.request.url, self.message
        )?;
        if let Some(status) = self.status() {
            write!(f, " (HTTP {status})")?;
        }
        if self.transient {
            f.write_str(" [transient]")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Unified error type for the upstream client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Api(Box<ApiError>),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Lifecycle error: {message}")]
    Lifecycle { message: String },

    #[error("Codec error: {message}{}", format_context(.context))]
    Codec {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration document error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(Box::new(err))
    }
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn codec_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Codec {
            message: msg.into(),
            context,
        }
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Error::Lifecycle {
            message: msg.into(),
        }
    }

    /// The call-failure payload, if this is a taxonomy error.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        self.api().map(|e| e.kind)
    }

    pub fn is_transient(&self) -> bool {
        self.api().map(|e| e.transient).unwrap_or(false)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Codec { context, .. } => Some(context),
            _ => None,
        }
    }
}
