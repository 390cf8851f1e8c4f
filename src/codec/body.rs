//! JSON request/response body handling.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::{Error, ErrorContext, Result};

/// Caller-supplied request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured value, serialized to JSON when a JSON content type is in effect.
    Json(Value),
    /// Pre-rendered text, sent as-is.
    Text(String),
}

impl From<Value> for RequestBody {
    fn from(v: Value) -> Self {
        RequestBody::Json(v)
    }
}

impl From<String> for RequestBody {
    fn from(v: String) -> Self {
        RequestBody::Text(v)
    }
}

impl From<&str> for RequestBody {
    fn from(v: &str) -> Self {
        RequestBody::Text(v.to_string())
    }
}

/// Post-parse transform applied bottom-up to every member, like a `JSON.parse` reviver.
///
/// Called with the member key (array index as text, `""` for the root) and the
/// already-revived value. Returning `None` drops the member.
#[derive(Clone)]
pub struct Reviver(Arc<dyn Fn(&str, Value) -> Option<Value> + Send + Sync>);

impl Reviver {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, root: Value) -> Value {
        self.walk("", root).unwrap_or(Value::Null)
    }

    fn walk(&self, key: &str, value: Value) -> Option<Value> {
        let value = match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter_map(|(k, v)| self.walk(&k, v).map(|v| (k, v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| self.walk(&i.to_string(), v).unwrap_or(Value::Null))
                    .collect(),
            ),
            other => other,
        };
        (self.0)(key, value)
    }
}

impl fmt::Debug for Reviver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reviver(..)")
    }
}

/// `true` for `application/json` and any `+json` structured-syntax suffix.
pub fn is_json_media_type(media_type: &str) -> bool {
    let media = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

/// Render a request body to text, serializing structured bodies when `json` is in effect.
pub fn render_body(body: &RequestBody, json: bool) -> Result<String> {
    match body {
        RequestBody::Text(text) => Ok(text.clone()),
        RequestBody::Json(value) if json => Ok(serde_json::to_string(value)?),
        RequestBody::Json(_) => Err(Error::validation_with_context(
            "structured body requires a JSON content-type",
            ErrorContext::new()
                .with_field_path("headers.content-type")
                .with_source("request_builder"),
        )),
    }
}

/// Parse JSON text, applying the reviver when present.
///
/// Empty or whitespace-only text decodes to `None`.
pub fn parse_json(text: &str, reviver: Option<&Reviver>) -> Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(text)?;
    Ok(Some(match reviver {
        Some(r) => r.apply(value),
        None => value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("application/problem+json"));
        assert!(!is_json_media_type("text/plain"));
        assert!(!is_json_media_type("application/jsonl"));
    }

    #[test]
    fn test_render_structured_body_requires_json() {
        let body = RequestBody::Json(json!({"a": 1}));
        assert_eq!(render_body(&body, true).unwrap(), r#"{"a":1}"#);
        assert!(render_body(&body, false).is_err());
        let text = RequestBody::from("raw");
        assert_eq!(render_body(&text, false).unwrap(), "raw");
    }

    #[test]
    fn test_parse_empty_text_is_none() {
        assert_eq!(parse_json("  ", None).unwrap(), None);
        assert!(parse_json("{oops", None).is_err());
    }

    #[test]
    fn test_reviver_runs_bottom_up_and_can_drop_members() {
        let reviver = Reviver::new(|key, value| match key {
            "secret" => None,
            "n" => value.as_i64().map(|n| json!(n * 10)),
            _ => Some(value),
        });
        let parsed = parse_json(
            r#"{"n": 2, "secret": "x", "items": [{"n": 3}]}"#,
            Some(&reviver),
        )
        .unwrap()
        .unwrap();
        assert_eq!(parsed, json!({"n": 20, "items": [{"n": 30}]}));
    }
}
