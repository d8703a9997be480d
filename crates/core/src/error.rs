use thiserror::Error;

use crate::model_client;

/// Errors that terminate an agent run.
///
/// Tool failures never show up here; they are recorded as data the model
/// can reason about.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The language model could not be reached after exhausting retries.
    #[error(transparent)]
    ModelInvocation(#[from] model_client::Error),
    /// The run's cancellation token was signaled.
    #[error("the run was cancelled")]
    Cancelled,
    /// The loop panicked, typically inside a model provider or the
    /// approval callback.
    #[error("the run panicked: {0}")]
    Panicked(String),
}
