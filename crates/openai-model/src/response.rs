use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use finscout_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    TokenUsage, ToolCallRequest,
};
use serde_json::Value;

use crate::Error;
use crate::proto::ChatCompletion;

/// A fully received chat completion, replayed as model response events.
pub struct OpenAIResponse {
    events: VecDeque<ModelResponseEvent>,
}

impl OpenAIResponse {
    pub fn from_completion(mut completion: ChatCompletion) -> Result<Self, Error> {
        let Some(choice) = completion.choices.pop() else {
            return Err(Error::new("completion has no choices", ErrorKind::Other));
        };
        trace!("completion {} finished with {:?}", completion.id, choice.finish_reason);

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("content_filter") => {
                return Err(Error::new(
                    "completion was blocked by the content filter",
                    ErrorKind::Moderated,
                ));
            }
            Some("tool_calls") => ModelFinishReason::ToolCalls,
            _ => ModelFinishReason::Stop,
        };

        // The order of events mirrors a streamed response: reasoning first,
        // then text, then tool calls, usage and the finish reason.
        let mut events = VecDeque::new();
        let message = choice.message;
        if let Some(reasoning) = message.reasoning_content.filter(|s| !s.is_empty()) {
            events.push_back(ModelResponseEvent::ReasoningDelta(reasoning));
        }
        if let Some(content) = message.content.filter(|s| !s.is_empty()) {
            events.push_back(ModelResponseEvent::MessageDelta(content));
        }
        for tool_call in message.tool_calls.unwrap_or_default() {
            let arguments = parse_arguments(&tool_call.function.arguments);
            events.push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                id: tool_call.id,
                name: tool_call.function.name,
                arguments,
            }));
        }
        if let Some(usage) = completion.usage {
            events.push_back(ModelResponseEvent::Usage(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }));
        }
        events.push_back(ModelResponseEvent::Completed(finish_reason));

        Ok(Self { events })
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        Poll::Ready(Ok(self.get_mut().events.pop_front()))
    }
}

/// Models occasionally produce arguments that are not valid JSON. Those are
/// passed through as a string so that the tool reports a validation error
/// back to the model instead of the whole response failing.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!("model produced malformed tool arguments: {err}");
        Value::String(raw.to_owned())
    })
}
