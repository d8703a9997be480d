use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialResolver;
use crate::model_client::RetryPolicy;
use crate::tool::ApprovalCallback;

/// Per-run configuration of an [`Agent`](super::Agent).
#[derive(Clone)]
pub struct AgentConfig {
    /// The model identifier, if the caller wants to pick one.
    pub model: Option<String>,
    /// The model provider name, if the caller wants to pick one.
    pub model_provider: Option<String>,
    /// Upper bound on loop iterations.
    pub max_iterations: usize,
    /// Credentials that take precedence over the process configuration.
    pub credentials: Option<Arc<dyn CredentialResolver>>,
    /// Signaled to stop the run.
    pub cancellation: Option<CancellationToken>,
    /// Asked before each tool call. Without it every call proceeds.
    pub approval: Option<ApprovalCallback>,
    /// Tools that never ask for approval in this run.
    pub session_approved_tools: HashSet<String>,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
    /// Calls per tool after which the model is nudged to answer.
    pub tool_call_soft_limit: usize,
    /// Capacity of the event channel.
    pub event_buffer: usize,
    /// How failed model calls are retried.
    pub retry: RetryPolicy,
}

impl AgentConfig {
    /// Sets the model identifier.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the model provider name.
    #[inline]
    pub fn with_model_provider<S: Into<String>>(mut self, provider: S) -> Self {
        self.model_provider = Some(provider.into());
        self
    }

    /// Sets the iteration budget.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the credential override.
    #[inline]
    pub fn with_credentials(
        mut self,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the cancellation token.
    #[inline]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Sets the approval callback.
    #[inline]
    pub fn with_approval(mut self, approval: ApprovalCallback) -> Self {
        self.approval = Some(approval);
        self
    }

    /// Marks a tool as approved for the whole run.
    #[inline]
    pub fn with_session_approved_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.session_approved_tools.insert(tool.into());
        self
    }

    /// Replaces the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the per-tool soft limit.
    #[inline]
    pub fn with_tool_call_soft_limit(mut self, limit: usize) -> Self {
        self.tool_call_soft_limit = limit;
        self
    }

    /// Sets the event channel capacity.
    #[inline]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Sets the retry policy of model calls.
    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            model_provider: None,
            max_iterations: 10,
            credentials: None,
            cancellation: None,
            approval: None,
            session_approved_tools: HashSet::new(),
            system_prompt: None,
            tool_call_soft_limit: 3,
            event_buffer: 64,
            retry: RetryPolicy::default(),
        }
    }
}

impl Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("model_provider", &self.model_provider)
            .field("max_iterations", &self.max_iterations)
            .field("has_credentials", &self.credentials.is_some())
            .field("has_approval", &self.approval.is_some())
            .field("session_approved_tools", &self.session_approved_tools)
            .field("tool_call_soft_limit", &self.tool_call_soft_limit)
            .field("event_buffer", &self.event_buffer)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
