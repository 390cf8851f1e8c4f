//! Layered request settings.
//!
//! Three layers merge with later ones winning: library defaults, the configured
//! defaults, then the per-call options. Headers merge key by key; a header whose
//! final value is unset (`None`) is removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::codec::{QueryParams, QueryValue, RequestBody, Reviver};

/// Default delays between attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [100, 1000, 3000];

/// Library-wide fallback retry count. Shadowed by the per-verb seed of `0`.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// How redirects are handled by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectMode {
    #[default]
    Follow,
    /// Treat any redirect as a transport failure.
    Error,
    /// Hand the 3xx response back untouched.
    Manual,
}

/// Settings shared by configured defaults and per-call options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Lowercase header name to value; `None` unsets a header inherited from a lower layer.
    pub headers: BTreeMap<String, Option<String>>,
    pub retry_count: Option<u32>,
    /// Milliseconds to wait before each retry; the last entry is reused.
    pub retry_delays: Option<Vec<u64>>,
    pub redirect: Option<RedirectMode>,
    pub keep_alive: Option<bool>,
    /// Treat 404/410 as success.
    pub optional: Option<bool>,
    pub deserialize: Option<bool>,
    /// Enable legacy upstream compatibility quirks.
    pub noi: Option<bool>,
}

impl RequestSettings {
    /// The hard-coded bottom layer.
    pub fn library_defaults() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), Some("application/json".to_string()));
        headers.insert(
            "content-type".to_string(),
            Some("application/json".to_string()),
        );
        Self {
            headers,
            retry_count: Some(DEFAULT_RETRY_COUNT),
            retry_delays: Some(DEFAULT_RETRY_DELAYS_MS.to_vec()),
            redirect: Some(RedirectMode::Follow),
            keep_alive: Some(true),
            optional: Some(false),
            deserialize: Some(true),
            noi: Some(false),
        }
    }

    /// Overlay `upper` on top of `self`.
    pub fn merged_with(&self, upper: &RequestSettings) -> RequestSettings {
        let mut headers = self.headers.clone();
        for (name, value) in &upper.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        RequestSettings {
            headers,
            retry_count: upper.retry_count.or(self.retry_count),
            retry_delays: upper
                .retry_delays
                .clone()
                .or_else(|| self.retry_delays.clone()),
            redirect: upper.redirect.or(self.redirect),
            keep_alive: upper.keep_alive.or(self.keep_alive),
            optional: upper.optional.or(self.optional),
            deserialize: upper.deserialize.or(self.deserialize),
            noi: upper.noi.or(self.noi),
        }
    }

    /// Normalise header names to lowercase; used on configuration documents.
    pub(crate) fn normalized(mut self) -> Self {
        self.headers = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self
    }
}

/// Options for one call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub settings: RequestSettings,
    pub query: QueryParams,
    pub body: Option<RequestBody>,
    pub cancel: Option<CancellationToken>,
    pub reviver: Option<Reviver>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings
            .headers
            .insert(name.into().to_ascii_lowercase(), Some(value.into()));
        self
    }

    /// Remove a header set by a lower layer (e.g. `content-type` when sending no body).
    pub fn unset_header(mut self, name: impl Into<String>) -> Self {
        self.settings
            .headers
            .insert(name.into().to_ascii_lowercase(), None);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.settings.retry_count = Some(count);
        self
    }

    pub fn retry_delays(mut self, delays_ms: Vec<u64>) -> Self {
        self.settings.retry_delays = Some(delays_ms);
        self
    }

    pub fn redirect(mut self, mode: RedirectMode) -> Self {
        self.settings.redirect = Some(mode);
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.settings.keep_alive = Some(keep_alive);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.settings.optional = Some(optional);
        self
    }

    pub fn deserialize(mut self, deserialize: bool) -> Self {
        self.settings.deserialize = Some(deserialize);
        self
    }

    pub fn noi(mut self, noi: bool) -> Self {
        self.settings.noi = Some(noi);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn reviver(mut self, reviver: Reviver) -> Self {
        self.reviver = Some(reviver);
        self
    }
}

/// Fully merged view of one call's options.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Final headers, lowercase names, unset entries removed.
    pub headers: BTreeMap<String, String>,
    pub retry_count: u32,
    pub retry_delays: Vec<Duration>,
    pub redirect: RedirectMode,
    pub keep_alive: bool,
    pub optional: bool,
    pub deserialize: bool,
    pub noi: bool,
    pub query: QueryParams,
    pub body: Option<RequestBody>,
    pub cancel: Option<CancellationToken>,
    pub reviver: Option<Reviver>,
}

impl CallOptions {
    /// Merge library defaults, configured defaults and per-call options.
    pub fn resolve(configured: &RequestSettings, options: RequestOptions) -> Self {
        let merged = RequestSettings::library_defaults()
            .merged_with(configured)
            .merged_with(&options.settings);

        let headers = merged
            .headers
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();

        let retry_delays = merged
            .retry_delays
            .unwrap_or_else(|| DEFAULT_RETRY_DELAYS_MS.to_vec())
            .into_iter()
            .map(Duration::from_millis)
            .collect();

        Self {
            headers,
            retry_count: merged.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            retry_delays,
            redirect: merged.redirect.unwrap_or_default(),
            keep_alive: merged.keep_alive.unwrap_or(true),
            optional: merged.optional.unwrap_or(false),
            deserialize: merged.deserialize.unwrap_or(true),
            noi: merged.noi.unwrap_or(false),
            query: options.query,
            body: options.body,
            cancel: options.cancel,
            reviver: options.reviver,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }
}
