//! Error classification logic

use reqwest::StatusCode;
use serde_json::Value;

use crate::client::types::ApiResponse;
use crate::error::ApiErrorKind;

pub(crate) const PROBLEM_JSON: &str = "application/problem+json";

/// Upstream-unavailable statuses: the only ones the retry engine resends.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

/// 404 and 410 are "missing" and may be accepted by optional calls.
pub(crate) fn is_missing(status: StatusCode) -> bool {
    matches!(status.as_u16(), 404 | 410)
}

/// Pick the taxonomy member for a non-ok response.
///
/// - problem+json with a `status` member, or at HTTP 400 with `errors` => validation
/// - any other problem+json => origin
/// - everything else => generic
pub(crate) fn classify_failure(response: &ApiResponse, data: Option<&Value>) -> ApiErrorKind {
    if response.content_type().as_deref() != Some(PROBLEM_JSON) {
        return ApiErrorKind::Api;
    }
    let has_status = data.and_then(|d| d.get("status")).is_some();
    let has_errors = data.and_then(|d| d.get("errors")).is_some();
    if has_status || (response.status == StatusCode::BAD_REQUEST && has_errors) {
        ApiErrorKind::ApiValidation
    } else {
        ApiErrorKind::ApiOrigin
    }
}

/// Numeric reading of an embedded `status`: integers, whole floats and numeric strings.
pub(crate) fn status_code(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// In-body status of a legacy envelope, if it signals failure.
pub(crate) fn envelope_failure(body: &Value) -> Option<u16> {
    let status = status_code(body.get("status")?)?;
    if (200..=299).contains(&status) {
        None
    } else {
        Some(u16::try_from(status).unwrap_or(u16::MAX))
    }
}

pub(crate) fn is_transient_code(status: u16) -> bool {
    matches!(status, 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    fn response(status: u16, content_type: &'static str) -> ApiResponse {
        ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            url::Url::parse("https://api.example.com/v1/x").unwrap(),
        )
        .with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
    }

    #[test]
    fn test_transient_and_missing_sets() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_missing(StatusCode::GONE));
        assert!(!is_missing(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_problem_documents() {
        let errors = json!({"errors": {"email": ["invalid"]}});
        assert_eq!(
            classify_failure(&response(400, "application/problem+json"), Some(&errors)),
            ApiErrorKind::ApiValidation
        );
        // `errors` alone only counts at HTTP 400.
        assert_eq!(
            classify_failure(&response(422, "application/problem+json"), Some(&errors)),
            ApiErrorKind::ApiOrigin
        );
        // Any embedded status counts.
        let conflict = json!({"status": 409, "title": "Conflict"});
        assert_eq!(
            classify_failure(&response(409, "application/problem+json"), Some(&conflict)),
            ApiErrorKind::ApiValidation
        );
        let untitled = json!({"title": "Conflict", "detail": "stale version"});
        assert_eq!(
            classify_failure(&response(409, "application/problem+json"), Some(&untitled)),
            ApiErrorKind::ApiOrigin
        );
        assert_eq!(
            classify_failure(&response(400, "application/problem+json"), None),
            ApiErrorKind::ApiOrigin
        );
    }

    #[test]
    fn test_plain_failures_are_generic() {
        let errors = json!({"errors": {}});
        assert_eq!(
            classify_failure(&response(400, "application/json"), Some(&errors)),
            ApiErrorKind::Api
        );
    }

    #[test]
    fn test_envelope_failure() {
        assert_eq!(envelope_failure(&json!({"status": 404})), Some(404));
        assert_eq!(envelope_failure(&json!({"status": 201, "data": 1})), None);
        assert_eq!(envelope_failure(&json!({"data": 1})), None);
    }

    #[test]
    fn test_envelope_status_coercion() {
        assert_eq!(envelope_failure(&json!({"status": "404"})), Some(404));
        assert_eq!(envelope_failure(&json!({"status": 503.0})), Some(503));
        assert_eq!(envelope_failure(&json!({"status": " 200 "})), None);
        assert_eq!(envelope_failure(&json!({"status": "pending", "data": 1})), None);
        assert_eq!(envelope_failure(&json!({"status": 404.5})), None);
    }
}
