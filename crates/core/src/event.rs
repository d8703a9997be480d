//! Events emitted by an agent run.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use finscout_model::TokenUsage;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::scratchpad::ToolCallRecord;
use crate::tool::ToolOutcome;

/// An event emitted to the caller while a run progresses.
///
/// Exactly one terminal event (`Done` or `Error`) is produced per run, and
/// it is always the last one.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The agent is about to call the model.
    Thinking {
        /// A short status line.
        message: String,
    },
    /// A tool call is about to be invoked.
    ToolStart {
        /// The correlation id assigned by the model provider.
        id: String,
        /// Name of the tool.
        tool: String,
        /// Arguments requested by the model.
        args: Value,
    },
    /// A running tool reported progress.
    ToolProgress {
        /// The correlation id of the call.
        id: String,
        /// Name of the tool.
        tool: String,
        /// The progress message.
        message: String,
    },
    /// A tool call has finished, successfully or not.
    ToolEnd {
        /// The correlation id of the call.
        id: String,
        /// Name of the tool.
        tool: String,
        /// The outcome of the call.
        result: ToolOutcome,
        /// Wall-clock duration of the call.
        duration_ms: u64,
    },
    /// The run produced its answer.
    Done {
        /// The final answer text.
        answer: String,
        /// Every tool call made during the run, in invocation order.
        tool_calls: Vec<ToolCallRecord>,
        /// Number of loop iterations that ran.
        iterations: usize,
        /// Elapsed wall-clock time of the run.
        total_time_ms: u64,
        /// Token usage summed over all model calls, if reported.
        token_usage: Option<TokenUsage>,
    },
    /// The run failed.
    Error {
        /// Description of the failure.
        error: String,
    },
}

impl AgentEvent {
    /// Returns `true` for the events that end a run.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }
}

/// Producer side of a run's event channel.
#[derive(Clone, Debug)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSender {
    /// Sends an event, waiting for buffer space. Returns `false` if the
    /// consumer is gone.
    pub async fn emit(&self, event: AgentEvent) -> bool {
        trace!("emit event: {event:?}");
        self.tx.send(event).await.is_ok()
    }

    /// Sends an event if there is buffer space, dropping it otherwise.
    pub fn try_emit(&self, event: AgentEvent) {
        if let Err(err) = self.tx.try_send(event) {
            debug!("dropped event: {err}");
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a run's event channel.
///
/// The stream ends after the terminal event. Dropping it stops the run at
/// its next iteration boundary.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventStream {
    /// Creates a stream that yields a single `Error` event. Useful when a
    /// run cannot even be set up.
    pub fn failed<E: Display>(error: E) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(AgentEvent::Error {
            error: error.to_string(),
        })
        .ok();
        Self { rx }
    }

    /// Receives the next event, or `None` once the run has ended.
    #[inline]
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = AgentEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub(crate) fn channel(capacity: usize) -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventStream { rx })
}
