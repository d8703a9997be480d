//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use finscout_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::sleep;

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
}

impl TestModelResponse {
    fn from_preset(preset: &PresetResponse) -> Self {
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ReasoningDelta(msg) => {
                    ModelResponseEvent::ReasoningDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
                PresetEvent::Usage(usage) => ModelResponseEvent::Usage(*usage),
            })
            .collect();
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));
        Self { events }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // Returns `None` after completion since the queue stays empty.
        Poll::Ready(Ok(self.get_mut().events.pop_front()))
    }
}

#[derive(Default)]
struct Script {
    steps: Vec<PresetResponse>,
    next_step: usize,
    failed_attempts: u64,
    repeat_last_step: bool,
    requests: Vec<ModelRequest>,
}

impl Script {
    fn next_response(&mut self) -> Result<TestModelResponse, Error> {
        let step_idx = if self.next_step >= self.steps.len()
            && self.repeat_last_step
            && !self.steps.is_empty()
        {
            self.steps.len() - 1
        } else {
            self.next_step
        };
        let Some(step) = self.steps.get(step_idx) else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            });
        };

        if step.rejected {
            return Err(Error {
                message: "request rejected",
                kind: ErrorKind::InvalidRequest,
            });
        }

        match step.failures {
            Some(0) => {
                return Err(Error {
                    message: "step always fails",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            Some(failures) if self.failed_attempts < failures => {
                self.failed_attempts += 1;
                return Err(Error {
                    message: "injected failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            _ => {}
        }

        let resp = TestModelResponse::from_preset(step);
        self.next_step += 1;
        self.failed_attempts = 0;
        Ok(resp)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. Steps are consumed in the
/// order requests arrive, and clones of the provider share the same script.
/// If there are no enough steps in the script, an error will be returned.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.lock().steps.push(preset);
    }

    /// Keeps answering with the last step once the script runs out.
    #[inline]
    pub fn repeat_last_step(&mut self) {
        self.lock().repeat_last_step = true;
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, failed attempts included.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn model(&self) -> &str {
        "test-model"
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = {
            let mut script = self.lock();
            script.requests.push(req.clone());
            script.next_response()
        };
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            result
        }
    }
}
