//! Response decoding and status evaluation.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cipher::Cipher;
use crate::client::error_classification::{
    classify_failure, envelope_failure, is_missing, is_transient_code, is_transient_status,
};
use crate::client::options::CallOptions;
use crate::client::types::{ApiRequest, ApiResponse, ApiResult};
use crate::codec::{is_json_media_type, parse_json};
use crate::error::{ApiError, ApiErrorKind};
use crate::Result;

/// Turn one final response into a typed result or a taxonomy error.
///
/// `cipher` is set when the call's endpoint obfuscates.
pub(crate) fn decode_response<T: DeserializeOwned>(
    request: ApiRequest,
    response: ApiResponse,
    options: &CallOptions,
    cipher: Option<&Cipher>,
) -> Result<ApiResult<T>> {
    let (mut value, parse_error) = match read_body(&response, options, cipher) {
        Ok(v) => (v, None),
        Err(e) => (None, Some(e)),
    };

    if options.noi {
        if let Some(body) = value.take() {
            if let Some(code) = envelope_failure(&body) {
                return Err(ApiError::new(
                    ApiErrorKind::NoiApiOrigin,
                    format!("legacy upstream reported status {code}"),
                    request,
                )
                .with_transient(is_transient_code(code))
                .with_response(response)
                .with_data(Some(body))
                .into());
            }
            value = unwrap_envelope(body);
        }
    }

    let accepted = response.ok() || (options.optional && is_missing(response.status));
    if !accepted {
        let kind = classify_failure(&response, value.as_ref());
        let message = format!("{} {}", response.status.as_u16(), response.status_text);
        return Err(ApiError::new(kind, message, request)
            .with_transient(is_transient_status(response.status))
            .with_response(response)
            .with_data(value)
            .into());
    }

    if let Some(reason) = parse_error {
        if response.ok() {
            return Err(ApiError::new(
                ApiErrorKind::Api,
                format!("undecodable response body: {reason}"),
                request,
            )
            .with_response(response)
            .into());
        }
    }

    // An accepted missing response usually carries an error payload, not a `T`.
    let missing = !response.ok();
    let body = match value {
        Some(v) => match serde_json::from_value::<T>(v.clone()) {
            Ok(body) => Some(body),
            Err(_) if missing => None,
            Err(e) => {
                return Err(ApiError::new(
                    ApiErrorKind::Api,
                    format!("response body does not match the expected type: {e}"),
                    request,
                )
                .with_response(response)
                .with_data(Some(v))
                .into())
            }
        },
        None => None,
    };
    Ok(ApiResult::new(request, response, body))
}

/// Sniff, deobfuscate and parse. `Ok(None)` when the body is not to be decoded.
fn read_body(
    response: &ApiResponse,
    options: &CallOptions,
    cipher: Option<&Cipher>,
) -> Result<Option<Value>> {
    let json = response
        .content_type()
        .map(|ct| is_json_media_type(&ct))
        .unwrap_or(false);
    if !options.deserialize || !json {
        return Ok(None);
    }

    let text = response.text();
    let text = match cipher {
        Some(c) if !text.trim().is_empty() => c.deobfuscate(text.trim())?,
        _ => text,
    };
    parse_json(&text, options.reviver.as_ref())
}

/// `{status, data}` envelope → `data`.
fn unwrap_envelope(body: Value) -> Option<Value> {
    match body {
        Value::Object(mut map) => map.remove("data").filter(|d| !d.is_null()),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::BASE_ALPHABET;
    use crate::client::options::{RequestOptions, RequestSettings};
    use crate::codec::Reviver;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use reqwest::{Method, StatusCode};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u32,
    }

    fn url() -> url::Url {
        url::Url::parse("https://api.example.com/v1/orders/1").unwrap()
    }

    fn request() -> ApiRequest {
        ApiRequest::new(Method::GET, url())
    }

    fn response(status: u16, content_type: &'static str, body: &str) -> ApiResponse {
        ApiResponse::new(StatusCode::from_u16(status).unwrap(), url())
            .with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
            .with_body(body.to_string())
    }

    fn opts(o: RequestOptions) -> CallOptions {
        CallOptions::resolve(&RequestSettings::default(), o)
    }

    #[test]
    fn test_typed_body() {
        let result: ApiResult<Order> = decode_response(
            request(),
            response(200, "application/json", r#"{"id": 7}"#),
            &opts(RequestOptions::new()),
            None,
        )
        .unwrap();
        assert_eq!(result.body(), Some(&Order { id: 7 }));
    }

    #[test]
    fn test_non_json_body_is_not_decoded() {
        let result: ApiResult<Value> = decode_response(
            request(),
            response(200, "text/plain", "hello"),
            &opts(RequestOptions::new()),
            None,
        )
        .unwrap();
        assert!(result.body().is_none());
        assert_eq!(result.response().text(), "hello");
    }

    #[test]
    fn test_deserialize_off_skips_parsing() {
        let result: ApiResult<Value> = decode_response(
            request(),
            response(200, "application/json", "not json"),
            &opts(RequestOptions::new().deserialize(false)),
            None,
        )
        .unwrap();
        assert!(result.body().is_none());
    }

    #[test]
    fn test_optional_missing_is_success() {
        let missing = || response(404, "application/json", "");
        let ok: ApiResult<Value> = decode_response(
            request(),
            missing(),
            &opts(RequestOptions::new().optional(true)),
            None,
        )
        .unwrap();
        assert_eq!(ok.status(), StatusCode::NOT_FOUND);
        assert!(ok.body().is_none());

        let err = decode_response::<Value>(request(), missing(), &opts(RequestOptions::new()), None)
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Api));
        assert_eq!(err.api().unwrap().status(), Some(404));
    }

    #[test]
    fn test_optional_missing_with_foreign_payload_has_no_body() {
        let result: ApiResult<Order> = decode_response(
            request(),
            response(410, "application/json", r#"{"message": "gone"}"#),
            &opts(RequestOptions::new().optional(true)),
            None,
        )
        .unwrap();
        assert_eq!(result.status(), StatusCode::GONE);
        assert!(result.body().is_none());
    }

    #[test]
    fn test_validation_error_carries_field_errors() {
        let err = decode_response::<Value>(
            request(),
            response(
                400,
                "application/problem+json",
                r#"{"status": 400, "errors": {"name": ["required"]}}"#,
            ),
            &opts(RequestOptions::new()),
            None,
        )
        .unwrap_err();
        let api = err.api().unwrap();
        assert_eq!(api.kind, ApiErrorKind::ApiValidation);
        assert_eq!(api.field_errors(), Some(&json!({"name": ["required"]})));
        assert!(!api.transient);
    }

    #[test]
    fn test_unparseable_error_body_leaves_data_empty() {
        let err = decode_response::<Value>(
            request(),
            response(409, "application/problem+json", "<html>"),
            &opts(RequestOptions::new()),
            None,
        )
        .unwrap_err();
        let api = err.api().unwrap();
        assert_eq!(api.kind, ApiErrorKind::ApiOrigin);
        assert!(api.data.is_none());
    }

    #[test]
    fn test_unparseable_ok_body_is_an_error() {
        let err = decode_response::<Value>(
            request(),
            response(200, "application/json", "{broken"),
            &opts(RequestOptions::new()),
            None,
        )
        .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Api));
    }

    #[test]
    fn test_legacy_envelope() {
        let ok: ApiResult<Order> = decode_response(
            request(),
            response(200, "application/json", r#"{"status": 200, "data": {"id": 3}}"#),
            &opts(RequestOptions::new().noi(true)),
            None,
        )
        .unwrap();
        assert_eq!(ok.into_body(), Some(Order { id: 3 }));

        let err = decode_response::<Value>(
            request(),
            response(200, "application/json", r#"{"status": 503, "message": "down"}"#),
            &opts(RequestOptions::new().noi(true)),
            None,
        )
        .unwrap_err();
        let api = err.api().unwrap();
        assert_eq!(api.kind, ApiErrorKind::NoiApiOrigin);
        assert!(api.transient);
        assert_eq!(api.embedded_status(), Some(503));
    }

    #[test]
    fn test_obfuscated_body_with_reviver() {
        let alphabet: String = BASE_ALPHABET.chars().rev().collect();
        let cipher = Cipher::new(&alphabet).unwrap();
        let body = cipher.obfuscate(r#"{"id": 5, "secret": "x"}"#);
        let reviver = Reviver::new(|key, value| (key != "secret").then_some(value));
        let result: ApiResult<Value> = decode_response(
            request(),
            response(200, "application/json", &body),
            &opts(RequestOptions::new().reviver(reviver)),
            Some(&cipher),
        )
        .unwrap();
        assert_eq!(result.body(), Some(&json!({"id": 5})));
    }
}
