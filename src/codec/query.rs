//! Deterministic query-string encoding.
//!
//! Parameters live in a `BTreeMap`, so iteration is already key-sorted and the
//! same logical query always yields the same URL.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

/// Query parameters of one call, sorted by key.
pub type QueryParams = BTreeMap<String, QueryValue>;

/// A value that can appear in a query string.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Duration(Duration),
    List(Vec<QueryValue>),
    /// Insertion-ordered key/value pairs.
    Map(Vec<(String, QueryValue)>),
}

impl QueryValue {
    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }

    /// Plain string conversion, before percent-encoding.
    fn plain(&self) -> String {
        match self {
            QueryValue::Null => String::new(),
            QueryValue::Bool(b) => b.to_string(),
            QueryValue::Int(i) => i.to_string(),
            QueryValue::UInt(u) => u.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::Text(s) => s.clone(),
            QueryValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            QueryValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            QueryValue::Duration(d) => iso_duration(*d),
            QueryValue::List(items) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(QueryValue::plain)
                .collect::<Vec<_>>()
                .join(","),
            QueryValue::Map(_) => serde_json::Value::from(self.clone()).to_string(),
        }
    }

    /// Encoded form of a scalar; nested collections collapse to their plain string.
    fn encode_scalar(&self) -> String {
        encode_component(&self.plain())
    }

    /// Encoded form of a top-level parameter value, `None` when it must be omitted.
    fn encode(&self) -> Option<String> {
        match self {
            QueryValue::Null => None,
            QueryValue::List(items) => Some(
                items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(QueryValue::encode_scalar)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            QueryValue::Map(pairs) => Some(
                pairs
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| format!("{}:{}", encode_component(k), v.encode_scalar()))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            other => Some(other.encode_scalar()),
        }
    }
}
/// Percent-encode like `encodeURIComponent`, also leaving `/` and `?` literal.
/// Percent-encode a query component the way `encodeURIComponent` does, also leaving `/` and `?` literal.
pub fn encode_component(raw: &str) -> String {
    let mut encoded = urlencoding::encode(raw).into_owned();
    for (escaped, literal) in LITERAL_ESCAPES {
        if encoded.contains(escaped) {
            encoded = encoded.replace(escaped, literal);
        }
    }
    encoded
}

/// Escapes undone after encoding: URI-component marks plus `/` and `?`.
const LITERAL_ESCAPES: [(&str, &str); 7] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
    ("%2F", "/"),
    ("%3F", "?"),
];

/// Render query parameters as `k=v&k2=v2` (no leading `?`).
///
/// Null parameters are dropped entirely.
pub fn encode_query(params: &QueryParams) -> String {
    params
        .iter()
        .filter_map(|(key, value)| {
            value
                .encode()
                .map(|encoded| format!("{}={}", encode_component(key), encoded))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// ISO-8601 duration balanced into hours, minutes and seconds (`PT1H2M3.5S`).
pub fn iso_duration(d: Duration) -> String {
    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let nanos = d.subsec_nanos();

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
        if nanos > 0 {
            let frac = format!("{:09}", nanos);
            out.push_str(&format!("{seconds}.{}S", frac.trim_end_matches('0')));
        } else {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

impl From<QueryValue> for serde_json::Value {
    fn from(value: QueryValue) -> Self {
        use serde_json::Value;
        match value {
            QueryValue::Null => Value::Null,
            QueryValue::Bool(b) => Value::Bool(b),
            QueryValue::Int(i) => Value::from(i),
            QueryValue::UInt(u) => Value::from(u),
            QueryValue::Float(f) => Value::from(f),
            QueryValue::Text(s) => Value::String(s),
            QueryValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            QueryValue::Map(pairs) => Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
            other => Value::String(other.plain()),
        }
    }
}

impl From<serde_json::Value> for QueryValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => QueryValue::Null,
            Value::Bool(b) => QueryValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    QueryValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    QueryValue::UInt(u)
                } else {
                    QueryValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => QueryValue::Text(s),
            Value::Array(items) => QueryValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                QueryValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

macro_rules! query_value_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(v: $ty) -> Self {
                    QueryValue::$variant(v as $cast)
                }
            }
        )*
    };
}

query_value_from!(
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue::Bool(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Text(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Text(v)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(v: DateTime<Utc>) -> Self {
        QueryValue::DateTime(v)
    }
}

impl From<NaiveDate> for QueryValue {
    fn from(v: NaiveDate) -> Self {
        QueryValue::Date(v)
    }
}

impl From<Duration> for QueryValue {
    fn from(v: Duration) -> Self {
        QueryValue::Duration(v)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(v: Vec<T>) -> Self {
        QueryValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryValue>> From<BTreeSet<T>> for QueryValue {
    fn from(v: BTreeSet<T>) -> Self {
        QueryValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryValue>> From<HashSet<T>> for QueryValue {
    fn from(v: HashSet<T>) -> Self {
        QueryValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<QueryValue>> From<BTreeMap<String, T>> for QueryValue {
    fn from(v: BTreeMap<String, T>) -> Self {
        QueryValue::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
