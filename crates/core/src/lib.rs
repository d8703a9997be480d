//! Core logic including agent loop, tool execution, configurations, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
pub mod credentials;
mod error;
pub mod event;
pub mod model_client;
pub mod scratchpad;
#[cfg(test)]
mod testing;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentConfig, BUDGET_EXHAUSTED_NOTE};
pub use error::AgentError;
pub use event::{AgentEvent, EventStream};
pub use model_client::{ModelClient, RetryPolicy};
pub use scratchpad::{RunContext, Scratchpad, ToolCallRecord};
pub use tokio_util::sync::CancellationToken;

/// Re-exports of [`finscout_model`] crate.
pub mod model {
    pub use finscout_model::*;
}
