mod builder;
mod config;
mod prompt;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use finscout_model::ModelRequest;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use builder::AgentBuilder;
pub use config::AgentConfig;
pub use prompt::BUDGET_EXHAUSTED_NOTE;

use crate::conversation::{ConversationHistory, Turn};
use crate::credentials::CredentialResolver;
use crate::error::AgentError;
use crate::event::{self, AgentEvent, EventSender, EventStream};
use crate::model_client::ModelClient;
use crate::scratchpad::RunContext;
use crate::tool::Registry;
use crate::tool::executor::Executor;

/// An agent that answers queries by alternating model calls and tool calls.
///
/// The agent itself holds no per-run state, so one instance can serve any
/// number of runs, concurrently or not. Each run owns a [`RunContext`]
/// that lives on the run's task.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    registry: Arc<Registry>,
    config: Arc<AgentConfig>,
    credentials: Arc<dyn CredentialResolver>,
}

impl Agent {
    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the tools available to the agent.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a run for `query` and returns its events.
    ///
    /// `history` is snapshotted before the run starts. The stream always
    /// ends with exactly one `Done` or `Error` event.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn run<S: Into<String>>(
        &self,
        query: S,
        history: Option<&dyn ConversationHistory>,
    ) -> EventStream {
        let turns = history.map(|h| h.recent_turns()).unwrap_or_default();
        let (events, stream) = event::channel(self.config.event_buffer);
        let agent = self.clone();
        let query = query.into();
        tokio::spawn(
            async move { agent.drive(query, turns, events).await }
                .instrument(debug_span!("agent run")),
        );
        stream
    }

    async fn drive(self, query: String, turns: Vec<Turn>, events: EventSender) {
        let started = Instant::now();
        let mut ctx = RunContext::new(
            query,
            self.config.session_approved_tools.clone(),
            self.config.tool_call_soft_limit,
        );

        let result = AssertUnwindSafe(self.iterate(&mut ctx, &turns, &events))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                error!("agent loop panicked");
                Err(AgentError::Panicked(panic_message(payload.as_ref())))
            });
        let terminal = match result {
            Ok(answer) => {
                info!("run finished after {} iteration(s)", ctx.iteration());
                AgentEvent::Done {
                    answer,
                    tool_calls: ctx.scratchpad().records().to_vec(),
                    iterations: ctx.iteration(),
                    total_time_ms: started.elapsed().as_millis() as u64,
                    token_usage: ctx.token_usage(),
                }
            }
            Err(err) => {
                warn!("run failed: {err}");
                AgentEvent::Error {
                    error: err.to_string(),
                }
            }
        };
        events.emit(terminal).await;
    }

    async fn iterate(
        &self,
        ctx: &mut RunContext,
        turns: &[Turn],
        events: &EventSender,
    ) -> Result<String, AgentError> {
        let cancellation = self.config.cancellation.clone().unwrap_or_default();
        let executor = Executor {
            registry: &self.registry,
            approval: self.config.approval.as_ref(),
            credentials: &self.credentials,
            cancellation: &cancellation,
        };
        let system_prompt = match &self.config.system_prompt {
            Some(prompt) => prompt.clone(),
            None => prompt::default_system_prompt(),
        };
        let tools = self.registry.definitions();

        while ctx.iteration() < self.config.max_iterations {
            if cancellation.is_cancelled() || events.is_closed() {
                return Err(AgentError::Cancelled);
            }

            let iteration = ctx.next_iteration();
            let message = if iteration == 1 {
                "Thinking about the query...".to_owned()
            } else {
                format!("Reviewing tool results (iteration {iteration})...")
            };
            events.emit(AgentEvent::Thinking { message }).await;

            let request = ModelRequest {
                messages: prompt::build_messages(&system_prompt, turns, ctx),
                tools: tools.clone(),
            };
            let resp = cancellable(&cancellation, self.model_client.send_request(request))
                .await??;
            ctx.add_usage(resp.usage);
            ctx.scratchpad_mut().add_thinking(resp.reasoning);

            if resp.tool_calls.is_empty() {
                return Ok(resp.transcript);
            }
            // Text alongside tool calls is thinking, never the answer.
            ctx.scratchpad_mut().add_thinking(resp.transcript);

            debug!("iteration {iteration}: {} tool call(s)", resp.tool_calls.len());
            executor
                .execute_all(resp.tool_calls, ctx, events)
                .instrument(debug_span!("tool executor", iteration))
                .await?;
        }

        info!("iteration budget of {} exhausted", self.config.max_iterations);
        Ok(prompt::budget_exhausted_answer(ctx))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

async fn cancellable<F: Future>(
    cancellation: &CancellationToken,
    fut: F,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(AgentError::Cancelled),
        output = fut => Ok(output),
    }
}
