//! Request execution: build, run the interceptor pipeline around the retry engine, decode.

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::core::Configured;
use super::decode::decode_response;
use super::options::{CallOptions, RequestOptions};
use super::request::RequestBuilder;
use super::types::ApiResult;
use crate::Result;

impl Configured {
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResult<T>> {
        let call = CallOptions::resolve(&self.config.defaults, options);
        let builder = RequestBuilder::new(&self.config, &self.resolver, self.cipher.as_ref());
        let built = builder.build(method, path, &call)?;
        let cipher = builder.cipher_for(&built.endpoint)?;

        debug!(
            method = %built.request.method,
            url = %built.request.url,
            version = %built.endpoint.version,
            retry_count = call.retry_count,
            "issuing upstream call"
        );

        let engine = &self.engine;
        let call_ref = &call;
        let response = self
            .pipeline
            .execute(built.request.clone(), &call, &self.config, |request| {
                engine.send(request, call_ref)
            })
            .await?;

        debug!(status = response.status.as_u16(), url = %response.url, "upstream responded");
        decode_response(built.request, response, &call, cipher)
    }
}
