use std::sync::Arc;

use crate::cipher::validate_alphabet;
use crate::client::endpoint::EndpointSettings;
use crate::client::options::RequestSettings;
use crate::config::ClientConfig;
use crate::interceptors::{Interceptor, InterceptorSource};
use crate::{Error, ErrorContext, Result};

/// Builder for [`ClientConfig`].
///
/// Keep this surface area small and predictable; validation happens in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    endpoint_url_pattern: Option<String>,
    noi_endpoint_url_pattern: Option<String>,
    cipher_alphabet: Option<String>,
    defaults: RequestSettings,
    endpoint_settings: Vec<(String, EndpointSettings)>,
    interceptors: Vec<InterceptorSource>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL template, e.g. `https://api.example.com/{version}/{path}`.
    pub fn endpoint_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.endpoint_url_pattern = Some(pattern.into());
        self
    }

    /// Set the template used for legacy-upstream (`noi`) calls.
    pub fn noi_endpoint_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.noi_endpoint_url_pattern = Some(pattern.into());
        self
    }

    /// Enable obfuscation with a permutation of the base64url alphabet.
    pub fn cipher_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.cipher_alphabet = Some(alphabet.into());
        self
    }

    pub fn defaults(mut self, defaults: RequestSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Register settings for a path prefix; `""` is the catch-all.
    ///
    /// Re-registering a prefix replaces its settings in place.
    pub fn endpoint(
        mut self,
        prefix: impl Into<String>,
        settings: impl Into<EndpointSettings>,
    ) -> Self {
        let prefix = prefix.into();
        let settings = settings.into();
        match self.endpoint_settings.iter_mut().find(|(p, _)| *p == prefix) {
            Some(existing) => existing.1 = settings,
            None => self.endpoint_settings.push((prefix, settings)),
        }
        self
    }

    /// Append a ready interceptor instance.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors
            .push(InterceptorSource::Instance(Arc::new(interceptor)));
        self
    }

    /// Append an interceptor constructed once at configure time.
    pub fn interceptor_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ClientConfig) -> Result<Arc<dyn Interceptor>> + Send + Sync + 'static,
    {
        self.interceptors
            .push(InterceptorSource::Factory(Arc::new(factory)));
        self
    }

    pub fn interceptor_source(mut self, source: InterceptorSource) -> Self {
        self.interceptors.push(source);
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let endpoint_url_pattern = self.endpoint_url_pattern.ok_or_else(|| {
            Error::configuration_with_context(
                "endpoint URL pattern is required",
                ErrorContext::new()
                    .with_field_path("endpoint_url_pattern")
                    .with_source("config_builder"),
            )
        })?;
        check_pattern("endpoint_url_pattern", &endpoint_url_pattern)?;
        if let Some(p) = &self.noi_endpoint_url_pattern {
            check_pattern("noi_endpoint_url_pattern", p)?;
        }

        if let Some(alphabet) = &self.cipher_alphabet {
            validate_alphabet(alphabet)?;
        }

        for (prefix, settings) in &self.endpoint_settings {
            if settings.version.trim().is_empty() {
                return Err(Error::configuration_with_context(
                    format!("endpoint settings for prefix '{prefix}' have an empty version"),
                    ErrorContext::new()
                        .with_field_path(format!("endpoint_settings.{prefix}.version"))
                        .with_source("config_builder"),
                ));
            }
        }
        if !self.endpoint_settings.iter().any(|(p, _)| p.is_empty()) {
            tracing::warn!("no catch-all (\"\") endpoint settings registered; unmatched paths will fail");
        }

        Ok(ClientConfig {
            endpoint_url_pattern,
            noi_endpoint_url_pattern: self.noi_endpoint_url_pattern,
            cipher_alphabet: self.cipher_alphabet,
            defaults: self.defaults,
            endpoint_settings: self.endpoint_settings,
            interceptors: self.interceptors,
        })
    }
}

fn check_pattern(field: &str, pattern: &str) -> Result<()> {
    if pattern.contains("{path}") {
        Ok(())
    } else {
        Err(Error::configuration_with_context(
            "URL pattern must contain a {path} placeholder",
            ErrorContext::new()
                .with_field_path(field)
                .with_details(pattern.to_string())
                .with_source("config_builder"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::BASE_ALPHABET;

    #[test]
    fn test_pattern_is_required() {
        assert!(matches!(
            ClientConfigBuilder::new().build(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_pattern_must_have_path_placeholder() {
        let err = ClientConfig::builder()
            .endpoint_url_pattern("https://api.example.com/{version}")
            .build()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("endpoint_url_pattern")
        );
    }

    #[test]
    fn test_rejects_bad_alphabet_and_empty_version() {
        assert!(ClientConfig::builder()
            .endpoint_url_pattern("https://h/{version}/{path}")
            .cipher_alphabet("short")
            .build()
            .is_err());
        assert!(ClientConfig::builder()
            .endpoint_url_pattern("https://h/{version}/{path}")
            .endpoint("", "")
            .build()
            .is_err());
    }

    #[test]
    fn test_reregistering_prefix_replaces_in_place() {
        let config = ClientConfig::builder()
            .endpoint_url_pattern("https://h/{version}/{path}")
            .cipher_alphabet(BASE_ALPHABET)
            .endpoint("", "v1")
            .endpoint("orders", "v2")
            .endpoint("", "v1.1")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint_settings,
            vec![
                ("".to_string(), EndpointSettings::new("v1.1")),
                ("orders".to_string(), EndpointSettings::new("v2")),
            ]
        );
    }
}
