use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONNECTION};
use reqwest::redirect::Policy;
use reqwest::Proxy;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Transport, TransportError};
use crate::client::options::RedirectMode;
use crate::client::types::{ApiRequest, ApiResponse};

pub const ENV_POOL_MAX_IDLE_PER_HOST: &str = "UPSTREAM_HTTP_POOL_MAX_IDLE_PER_HOST";
pub const ENV_POOL_IDLE_TIMEOUT_SECS: &str = "UPSTREAM_HTTP_POOL_IDLE_TIMEOUT_SECS";
pub const ENV_PROXY_URL: &str = "UPSTREAM_PROXY_URL";

const MAX_REDIRECTS: usize = 10;

/// Connection pool knobs shared by every pooled client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

impl PoolSettings {
    /// Minimal production-friendly defaults (env-overridable).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            max_idle_per_host: lookup(ENV_POOL_MAX_IDLE_PER_HOST)
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.max_idle_per_host),
            idle_timeout: lookup(ENV_POOL_IDLE_TIMEOUT_SECS)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            proxy_url: lookup(ENV_PROXY_URL).filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Keep-alive clients, one per (scheme, redirect mode), built on first use and kept for the
/// life of the transport.
#[derive(Debug)]
pub struct TransportPool {
    settings: PoolSettings,
    clients: Mutex<HashMap<(String, RedirectMode), reqwest::Client>>,
}

impl TransportPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of clients built so far.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn client(
        &self,
        scheme: &str,
        redirect: RedirectMode,
    ) -> std::result::Result<reqwest::Client, TransportError> {
        let key = (scheme.to_ascii_lowercase(), redirect);
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = self.build_client(redirect)?;
        debug!(scheme = %key.0, redirect = ?redirect, "created pooled HTTP client");
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn build_client(
        &self,
        redirect: RedirectMode,
    ) -> std::result::Result<reqwest::Client, TransportError> {
        let policy = match redirect {
            RedirectMode::Follow => Policy::limited(MAX_REDIRECTS),
            RedirectMode::Error => Policy::custom(|attempt| attempt.error("redirects are not allowed")),
            RedirectMode::Manual => Policy::none(),
        };

        // No request timeout: callers own deadlines through cancellation.
        let mut builder = reqwest::Client::builder()
            .redirect(policy)
            .pool_max_idle_per_host(self.settings.max_idle_per_host)
            .pool_idle_timeout(Some(self.settings.idle_timeout))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &self.settings.proxy_url {
            match Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL"),
            }
        }

        builder
            .build()
            .map_err(|e| TransportError::Permanent(format!("failed to build HTTP client: {e}")))
    }
}

/// `reqwest`-backed transport.
#[derive(Debug)]
pub struct HttpTransport {
    pool: TransportPool,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_settings(PoolSettings::from_env())
    }

    pub fn with_settings(settings: PoolSettings) -> Self {
        Self {
            pool: TransportPool::new(settings),
        }
    }

    pub fn pool(&self) -> &TransportPool {
        &self.pool
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let client = self.pool.client(request.url.scheme(), request.redirect)?;

        let mut headers = request.headers;
        if !request.keep_alive {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let mut builder = client.request(request.method, request.url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = ApiResponse::new(status, url).with_body(body);
        out.headers = headers;
        Ok(out)
    }
}
