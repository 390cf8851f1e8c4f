//! Endpoint resolution: longest path-prefix match to per-endpoint settings.

use serde::{Deserialize, Serialize};

use crate::{Error, ErrorContext, Result};

/// Settings for every path under one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSettings {
    pub version: String,
    /// `None` means "obfuscate iff a cipher is configured".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscate: Option<bool>,
}

impl EndpointSettings {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            obfuscate: None,
        }
    }

    pub fn with_obfuscate(mut self, obfuscate: bool) -> Self {
        self.obfuscate = Some(obfuscate);
        self
    }
}

impl From<&str> for EndpointSettings {
    fn from(version: &str) -> Self {
        EndpointSettings::new(version)
    }
}

impl From<String> for EndpointSettings {
    fn from(version: String) -> Self {
        EndpointSettings::new(version)
    }
}

impl<'de> Deserialize<'de> for EndpointSettings {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Input {
            // Shorthand: orders: "v2"
            Version(String),
            // Full form
            Obj {
                version: String,
                #[serde(default)]
                obfuscate: Option<bool>,
            },
        }

        match Input::deserialize(deserializer)? {
            Input::Version(version) => Ok(EndpointSettings::new(version)),
            Input::Obj { version, obfuscate } => Ok(EndpointSettings { version, obfuscate }),
        }
    }
}

/// Effective settings for one logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// The matched prefix (`""` for the catch-all).
    pub prefix: String,
    pub version: String,
    pub obfuscate: bool,
}

/// Prefix table built once at configure time.
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    entries: Vec<(String, EndpointSettings)>,
    cipher_configured: bool,
}

impl EndpointResolver {
    pub fn new<I, K>(entries: I, cipher_configured: bool) -> Self
    where
        I: IntoIterator<Item = (K, EndpointSettings)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            cipher_configured,
        }
    }

    /// Find the settings of the longest prefix `k` with `path == k` or `path` under `k/`.
    ///
    /// Among equally long matches the first registered wins.
    pub fn resolve(&self, path: &str) -> Result<ResolvedEndpoint> {
        let mut best: Option<&(String, EndpointSettings)> = None;
        for entry in &self.entries {
            let key = entry.0.as_str();
            if !prefix_matches(key, path) {
                continue;
            }
            if best.map_or(true, |b| key.len() > b.0.len()) {
                best = Some(entry);
            }
        }

        let (prefix, settings) = best.ok_or_else(|| {
            Error::configuration_with_context(
                format!("no endpoint settings match path '{path}'"),
                ErrorContext::new()
                    .with_field_path("endpoint_settings")
                    .with_details("register a \"\" entry as the catch-all default")
                    .with_source("endpoint_resolver"),
            )
        })?;

        if settings.version.trim().is_empty() {
            return Err(Error::configuration_with_context(
                format!("endpoint settings for prefix '{prefix}' have no version"),
                ErrorContext::new()
                    .with_field_path(format!("endpoint_settings.{prefix}.version"))
                    .with_source("endpoint_resolver"),
            ));
        }

        Ok(ResolvedEndpoint {
            prefix: prefix.clone(),
            version: settings.version.clone(),
            obfuscate: settings.obfuscate.unwrap_or(self.cipher_configured),
        })
    }
}

fn prefix_matches(key: &str, path: &str) -> bool {
    key.is_empty()
        || path == key
        || (path.len() > key.len() && path.starts_with(key) && path.as_bytes()[key.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(cipher: bool) -> EndpointResolver {
        EndpointResolver::new(
            vec![
                ("", EndpointSettings::new("v1")),
                ("orders", EndpointSettings::new("v2")),
                ("orders/archive", EndpointSettings::new("v3").with_obfuscate(false)),
            ],
            cipher,
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        let r = resolver(false);
        assert_eq!(r.resolve("orders/123").unwrap().version, "v2");
        assert_eq!(r.resolve("orders").unwrap().version, "v2");
        assert_eq!(r.resolve("orders/archive/9").unwrap().version, "v3");
        assert_eq!(r.resolve("routes").unwrap().version, "v1");
    }

    #[test]
    fn test_prefix_must_end_at_segment_boundary() {
        let r = resolver(false);
        let resolved = r.resolve("ordersummary").unwrap();
        assert_eq!(resolved.version, "v1");
        assert_eq!(resolved.prefix, "");
    }

    #[test]
    fn test_missing_default_fails() {
        let r = EndpointResolver::new(vec![("orders", EndpointSettings::new("v2"))], false);
        let err = r.resolve("routes").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_empty_version_fails() {
        let r = EndpointResolver::new(vec![("", EndpointSettings::new(""))], false);
        assert!(matches!(
            r.resolve("anything"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_obfuscate_follows_cipher_unless_explicit() {
        assert!(resolver(true).resolve("orders/1").unwrap().obfuscate);
        assert!(!resolver(false).resolve("orders/1").unwrap().obfuscate);
        assert!(!resolver(true).resolve("orders/archive").unwrap().obfuscate);
        let forced = EndpointResolver::new(
            vec![("", EndpointSettings::new("v1").with_obfuscate(true))],
            false,
        );
        assert!(forced.resolve("x").unwrap().obfuscate);
    }

    #[test]
    fn test_shorthand_deserialize() {
        let yaml = r#"
"": v1
orders:
  version: v2
  obfuscate: false
"#;
        let map: std::collections::BTreeMap<String, EndpointSettings> =
            serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map[""], EndpointSettings::new("v1"));
        assert_eq!(map["orders"], EndpointSettings::new("v2").with_obfuscate(false));
    }
}
