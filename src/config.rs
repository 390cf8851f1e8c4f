//! Client configuration.
//!
//! `ClientConfig` is the immutable value handed to [`crate::ApiClient::configure`].
//! `ClientSettings` is its serde-loadable document form (YAML or JSON) for
//! deployments that keep endpoint tables in files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::client::builder::ClientConfigBuilder;
use crate::client::endpoint::EndpointSettings;
use crate::client::options::RequestSettings;
use crate::interceptors::InterceptorSource;
use crate::Result;

/// Overrides `endpoint_url_pattern`.
pub const ENV_ENDPOINT_URL_PATTERN: &str = "UPSTREAM_ENDPOINT_URL_PATTERN";
/// Overrides `noi_endpoint_url_pattern`.
pub const ENV_NOI_ENDPOINT_URL_PATTERN: &str = "UPSTREAM_NOI_ENDPOINT_URL_PATTERN";
/// Overrides `cipher_alphabet`.
pub const ENV_CIPHER_ALPHABET: &str = "UPSTREAM_CIPHER_ALPHABET";

/// Process-wide client configuration. Build with [`ClientConfig::builder`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL template with `{version}` and `{path}` placeholders.
    pub endpoint_url_pattern: String,
    /// Template used instead when a call sets `noi`.
    pub noi_endpoint_url_pattern: Option<String>,
    /// Permutation of [`crate::cipher::BASE_ALPHABET`]; enables obfuscation.
    pub cipher_alphabet: Option<String>,
    pub defaults: RequestSettings,
    /// Path prefix to settings, in registration order.
    pub endpoint_settings: Vec<(String, EndpointSettings)>,
    /// Interceptors in execution order.
    pub interceptors: Vec<InterceptorSource>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// URL template for a call, honouring the legacy-upstream switch.
    pub fn url_pattern(&self, noi: bool) -> &str {
        if noi {
            self.noi_endpoint_url_pattern
                .as_deref()
                .unwrap_or(&self.endpoint_url_pattern)
        } else {
            &self.endpoint_url_pattern
        }
    }
}

/// Serializable configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub endpoint_url_pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noi_endpoint_url_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_alphabet: Option<String>,
    pub defaults: RequestSettings,
    pub endpoint_settings: BTreeMap<String, EndpointSettings>,
}

impl ClientSettings {
    /// Parse a YAML document (JSON is accepted too, being a YAML subset).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Apply `UPSTREAM_*` environment overrides.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub(crate) fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_ENDPOINT_URL_PATTERN) {
            self.endpoint_url_pattern = v;
        }
        if let Some(v) = non_empty(ENV_NOI_ENDPOINT_URL_PATTERN) {
            self.noi_endpoint_url_pattern = Some(v);
        }
        if let Some(v) = non_empty(ENV_CIPHER_ALPHABET) {
            self.cipher_alphabet = Some(v);
        }
        self
    }

    /// Seed a builder; interceptors are added on the builder.
    pub fn into_builder(self) -> ClientConfigBuilder {
        let mut builder = ClientConfig::builder()
            .endpoint_url_pattern(self.endpoint_url_pattern)
            .defaults(self.defaults.normalized());
        if let Some(p) = self.noi_endpoint_url_pattern {
            builder = builder.noi_endpoint_url_pattern(p);
        }
        if let Some(a) = self.cipher_alphabet {
            builder = builder.cipher_alphabet(a);
        }
        for (prefix, settings) in self.endpoint_settings {
            builder = builder.endpoint(prefix, settings);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
endpoint_url_pattern: "https://api.example.com/{version}/{path}"
noi_endpoint_url_pattern: "https://legacy.example.com/api/{version}/{path}"
defaults:
  headers:
    x-client: storefront
  retry_delays: [10, 20]
endpoint_settings:
  "": v1
  orders:
    version: v2
    obfuscate: false
"#;

    #[test]
    fn test_yaml_document_builds_config() {
        let settings = ClientSettings::from_yaml_str(DOC).unwrap();
        let config = settings.into_builder().build().unwrap();
        assert_eq!(config.endpoint_settings.len(), 2);
        assert_eq!(
            config.url_pattern(true),
            "https://legacy.example.com/api/{version}/{path}"
        );
        assert_eq!(config.defaults.retry_delays, Some(vec![10, 20]));
    }

    #[test]
    fn test_json_document_parses() {
        let json = r#"{"endpoint_url_pattern": "http://h/{version}/{path}", "endpoint_settings": {"": "v9"}}"#;
        let settings = ClientSettings::from_json_str(json).unwrap();
        assert_eq!(settings.endpoint_settings[""], EndpointSettings::new("v9"));
    }

    #[test]
    fn test_env_overrides() {
        let settings = ClientSettings::from_yaml_str(DOC).unwrap();
        let overridden = settings.apply_overrides(|name| match name {
            ENV_ENDPOINT_URL_PATTERN => Some("http://localhost:8080/{version}/{path}".into()),
            ENV_CIPHER_ALPHABET => Some("   ".into()),
            _ => None,
        });
        assert_eq!(
            overridden.endpoint_url_pattern,
            "http://localhost:8080/{version}/{path}"
        );
        assert!(overridden.cipher_alphabet.is_none());
    }

    #[test]
    fn test_noi_pattern_falls_back_to_primary() {
        let config = ClientConfig::builder()
            .endpoint_url_pattern("https://api.example.com/{version}/{path}")
            .endpoint("", "v1")
            .build()
            .unwrap();
        assert_eq!(config.url_pattern(true), config.url_pattern(false));
    }
}
