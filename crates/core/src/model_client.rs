//! A type-erased, retrying client over a [`ModelProvider`].

use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use finscout_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, TokenUsage, ToolCallRequest,
};
use thiserror::Error;
use tracing::Instrument;

type SendRequestResult = Result<ModelClientResponse, Error>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn = Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// How failed model calls are retried.
///
/// The delay before retry `k` is `base_delay * 2^(k-1)`, capped at
/// `max_delay`. Errors of kind [`ErrorKind::Moderated`] and
/// [`ErrorKind::InvalidRequest`] are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[inline]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// The model call failed after exhausting its retries.
#[derive(Clone, Debug, Error)]
#[error("model invocation failed after {attempts} attempt(s): {message}")]
pub struct Error {
    attempts: u32,
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Returns how many attempts were made.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the kind of the last provider error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message of the last provider error.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_provider<E: ModelProviderError>(err: E) -> Self {
        Self {
            attempts: 0,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    model: Arc<str>,
    retry: RetryPolicy,
}

impl ModelClient {
    /// Wraps a provider with the default [`RetryPolicy`].
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        let model: Arc<str> = Arc::from(provider.model());
        // Erase `P` so that callers never carry the provider type around.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            trace!("got a request: {req:?}");
            let fut = provider.send_request(&req);
            Box::pin(
                async move { handle_response::<P>(fut.await).await }
                    .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            model,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the identifier of the underlying model.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends a request and collects the complete response, retrying
    /// transient failures according to the retry policy.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the future abandons the
    /// in-flight attempt.
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;
        let operation = || {
            attempts += 1;
            let attempt = attempts;
            let fut = (self.handler_fn)(req.clone());
            async move {
                fut.await.map_err(|mut err| {
                    err.attempts = attempt;
                    if attempt < max_attempts && err.kind.is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        };
        backoff::future::retry_notify(self.retry.backoff(), operation, |err, delay| {
            warn!("model call failed, retrying in {delay:?}: {err}");
        })
        .await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelClientResponse {
    /// The assistant text.
    pub transcript: String,
    /// The reasoning text, if the model exposed any.
    pub reasoning: String,
    /// Tool calls requested by the model, in the order they were emitted.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
    /// Token accounting, if the provider reported it.
    pub usage: Option<TokenUsage>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Error::from_provider(err));
        }
    };

    let mut collected = ModelClientResponse::default();

    let mut pinned_resp = pin!(resp);
    loop {
        let event = poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx))
            .await
            .map_err(|err| {
                error!("got an error: {err:?}");
                Error::from_provider(err)
            })?;
        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                collected.transcript.push_str(&msg);
            }
            ModelResponseEvent::ReasoningDelta(msg) => {
                collected.reasoning.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                collected.tool_calls.push(req);
            }
            ModelResponseEvent::Usage(usage) => {
                *collected.usage.get_or_insert_default() += usage;
            }
            ModelResponseEvent::Completed(reason) => {
                collected.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use finscout_model::ModelMessage;
    use finscout_test_model::{PresetEvent, PresetResponse, TestModelProvider};
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Price of AAPL?".to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::ReasoningDelta("Need a quote.".to_owned()),
            PresetEvent::MessageDelta("Checking ".to_owned()),
            PresetEvent::MessageDelta("prices.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: "financial_search".to_owned(),
                arguments: json!({ "query": "AAPL price" }),
            }),
            PresetEvent::Usage(TokenUsage {
                input_tokens: 12,
                output_tokens: 4,
                total_tokens: 16,
            }),
        ]));

        let model_client = ModelClient::new(provider);
        assert_eq!(model_client.model(), "test-model");

        let resp = model_client.send_request(request()).await.unwrap();
        assert_eq!(resp.transcript, "Checking prices.");
        assert_eq!(resp.reasoning, "Need a quote.");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
        assert_eq!(resp.usage.unwrap().total_tokens, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(
            PresetResponse::with_text("recovered").with_failures(2),
        );

        let model_client = ModelClient::new(provider.clone());
        let started = Instant::now();
        let resp = model_client.send_request(request()).await.unwrap();

        assert_eq!(resp.transcript, "recovered");
        assert_eq!(provider.requests().len(), 3);
        // 500ms before the second attempt, 1s before the third.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(
            PresetResponse::with_text("never").with_failures(0),
        );

        let model_client = ModelClient::new(provider.clone());
        let err = model_client.send_request(request()).await.unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(provider.requests().len(), 3);
        assert!(err.to_string().starts_with("model invocation failed after 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_not_retried() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_text("never").rejected());

        let model_client = ModelClient::new(provider.clone());
        let err = model_client.send_request(request()).await.unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let provider = TestModelProvider::default();
        let model_client =
            ModelClient::new(provider.clone()).with_retry(RetryPolicy::none());

        let err = model_client.send_request(request()).await.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(provider.requests().len(), 1);
    }
}
