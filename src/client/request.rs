//! Builds the outbound request for one logical call.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use url::Url;

use crate::cipher::Cipher;
use crate::client::endpoint::{EndpointResolver, ResolvedEndpoint};
use crate::client::options::CallOptions;
use crate::client::types::ApiRequest;
use crate::codec::{encode_query, is_json_media_type, render_body};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::{Error, ErrorContext, Result};

/// Built request plus the endpoint it resolved to (the decoder needs the obfuscation flag).
#[derive(Debug, Clone)]
pub(crate) struct BuiltRequest {
    pub request: ApiRequest,
    pub endpoint: ResolvedEndpoint,
}

pub(crate) struct RequestBuilder<'a> {
    config: &'a ClientConfig,
    resolver: &'a EndpointResolver,
    cipher: Option<&'a Cipher>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        config: &'a ClientConfig,
        resolver: &'a EndpointResolver,
        cipher: Option<&'a Cipher>,
    ) -> Self {
        Self {
            config,
            resolver,
            cipher,
        }
    }

    /// The cipher to apply for `endpoint`, if it obfuscates.
    pub fn cipher_for(&self, endpoint: &ResolvedEndpoint) -> Result<Option<&'a Cipher>> {
        if !endpoint.obfuscate {
            return Ok(None);
        }
        self.cipher.map(Some).ok_or_else(|| {
            Error::configuration_with_context(
                format!(
                    "endpoint '{}' requires obfuscation but no cipher alphabet is configured",
                    endpoint.prefix
                ),
                ErrorContext::new()
                    .with_field_path("cipher_alphabet")
                    .with_source("request_builder"),
            )
        })
    }

    /// `path` is the logical path without a leading `/`, segments already percent-encoded.
    pub fn build(&self, method: Method, path: &str, options: &CallOptions) -> Result<BuiltRequest> {
        let endpoint = self.resolver.resolve(path)?;
        let cipher = self.cipher_for(&endpoint)?;

        let url = self.build_url(path, &endpoint, cipher, options)?;
        let mut request = ApiRequest::new(method, url);
        request.headers = build_headers(options)?;
        request.redirect = options.redirect;
        request.keep_alive = options.keep_alive;
        request.cancel = options.cancel.clone();

        if options.is_cancelled() {
            return Err(ApiError::abort(request).into());
        }

        if let Some(body) = &options.body {
            let json = options
                .header("content-type")
                .map(is_json_media_type)
                .unwrap_or(false);
            let text = render_body(body, json)?;
            let text = match cipher {
                Some(c) => c.obfuscate(&text),
                None => text,
            };
            request.body = Some(Bytes::from(text));
        }

        Ok(BuiltRequest { request, endpoint })
    }

    fn build_url(
        &self,
        path: &str,
        endpoint: &ResolvedEndpoint,
        cipher: Option<&Cipher>,
        options: &CallOptions,
    ) -> Result<Url> {
        let path = match cipher {
            Some(c) => path
                .split('/')
                .map(|segment| c.obfuscate(segment))
                .collect::<Vec<_>>()
                .join("/"),
            None => path.to_string(),
        };

        let mut raw = self
            .config
            .url_pattern(options.noi)
            .replace("{version}", &endpoint.version)
            .replace("{path}", &path);

        let query = encode_query(&options.query);
        if !query.is_empty() {
            raw.push('?');
            match cipher {
                Some(c) => raw.push_str(&c.obfuscate(&query)),
                None => raw.push_str(&query),
            }
        }

        Url::parse(&raw).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid request URL: {e}"),
                ErrorContext::new()
                    .with_field_path("endpoint_url_pattern")
                    .with_details(raw.clone())
                    .with_source("request_builder"),
            )
        })
    }
}

fn build_headers(options: &CallOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(options.headers.len());
    for (name, value) in &options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes());
        let header_value = HeaderValue::from_str(value);
        match (header_name, header_value) {
            (Ok(n), Ok(v)) => {
                headers.insert(n, v);
            }
            _ => {
                return Err(Error::validation_with_context(
                    format!("invalid header '{name}'"),
                    ErrorContext::new()
                        .with_field_path(format!("headers.{name}"))
                        .with_source("request_builder"),
                ))
            }
        }
    }
    Ok(headers)
}
