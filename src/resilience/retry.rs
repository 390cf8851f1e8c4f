use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{cancelled, sleep_or_cancel};
use crate::client::error_classification::is_transient_status;
use crate::client::options::CallOptions;
use crate::client::policy::{Decision, RetryPolicy};
use crate::client::types::{ApiRequest, ApiResponse};
use crate::error::{ApiError, ApiErrorKind};
use crate::transport::Transport;
use crate::Result;

/// Sends attempts through a [`Transport`] until success, a permanent failure,
/// exhaustion, or cancellation.
#[derive(Clone)]
pub struct RetryEngine {
    transport: Arc<dyn Transport>,
}

struct Failure {
    transient: bool,
    message: String,
    response: Option<ApiResponse>,
}

impl RetryEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, request: ApiRequest, options: &CallOptions) -> Result<ApiResponse> {
        let policy = RetryPolicy::from_options(options);
        let token = request.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            if request.is_cancelled() {
                return Err(ApiError::abort(request).into());
            }

            let outcome = tokio::select! {
                biased;
                _ = cancelled(token.as_ref()) => {
                    debug!(attempt, url = %request.url, "request cancelled in flight");
                    return Err(ApiError::abort(request).into());
                }
                outcome = self.transport.send(request.clone()) => outcome,
            };

            let failure = match outcome {
                Ok(response)
                    if options.noi
                        && response.status == StatusCode::OK
                        && response.body.is_empty() =>
                {
                    // The legacy upstream answers "not found" with an empty 200.
                    return Err(ApiError::new(
                        ApiErrorKind::NoiApiOrigin,
                        "legacy upstream returned an empty 200 response",
                        request,
                    )
                    .with_response(response)
                    .into());
                }
                Ok(response) if is_transient_status(response.status) => Failure {
                    transient: true,
                    message: format!("upstream unavailable (HTTP {})", response.status.as_u16()),
                    response: Some(response),
                },
                Ok(response) => return Ok(response),
                Err(e) => Failure {
                    transient: e.is_transient(),
                    message: e.to_string(),
                    response: None,
                },
            };

            match policy.decide(attempt, failure.transient) {
                Decision::Retry { delay } => {
                    warn!(
                        attempt,
                        method = %request.method,
                        url = %request.url,
                        delay_ms = delay.as_millis() as u64,
                        reason = %failure.message,
                        "transient failure, retrying"
                    );
                    if !sleep_or_cancel(delay, token.as_ref()).await {
                        return Err(ApiError::abort(request).into());
                    }
                    attempt += 1;
                }
                Decision::Fail => {
                    debug!(
                        attempts = attempt + 1,
                        transient = failure.transient,
                        url = %request.url,
                        "giving up"
                    );
                    let mut err = ApiError::new(ApiErrorKind::Api, failure.message, request)
                        .with_transient(failure.transient);
                    if let Some(response) = failure.response {
                        err = err.with_response(response);
                    }
                    return Err(err.into());
                }
            }
        }
    }
}
