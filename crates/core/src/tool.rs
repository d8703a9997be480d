//! Tool call supports.

mod approval;
mod error;
pub(crate) mod executor;
mod object;
mod registry;

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

pub use approval::{Approval, ApprovalCallback, ApprovalDecision};
pub use error::{Error, ErrorKind};
pub use registry::Registry;

use crate::credentials::CredentialResolver;

/// The result of a tool call.
pub type ToolResult = Result<ToolOutput, Error>;

/// Structured data produced by a successful tool call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The payload handed to the model.
    pub data: Value,
    /// Where the data came from, in the order the tool consulted them.
    pub source_urls: Vec<String>,
}

impl ToolOutput {
    /// Creates an output without provenance.
    #[inline]
    pub fn new(data: Value) -> Self {
        Self {
            data,
            source_urls: vec![],
        }
    }

    /// Attaches provenance URLs.
    #[inline]
    pub fn with_source_urls(mut self, source_urls: Vec<String>) -> Self {
        self.source_urls = source_urls;
        self
    }
}

/// The outcome of a tool call as seen across the dispatch boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool produced data.
    Success {
        /// The payload.
        data: Value,
        /// Provenance URLs.
        source_urls: Vec<String>,
    },
    /// The tool could not produce data.
    Failure {
        /// What went wrong.
        message: String,
    },
}

impl ToolOutcome {
    /// Creates a failure outcome.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        ToolOutcome::Failure {
            message: message.into(),
        }
    }

    /// Returns `true` for [`ToolOutcome::Success`].
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// Converts the result of a spawned tool task, turning panics and
    /// aborted tasks into failures.
    pub(crate) fn from_join(joined: Result<ToolResult, JoinError>) -> Self {
        match joined {
            Ok(result) => result.into(),
            Err(err) if err.is_panic() => {
                error!("tool panicked: {err}");
                ToolOutcome::failure("tool panicked")
            }
            Err(_) => ToolOutcome::failure("tool call was aborted"),
        }
    }
}

impl From<ToolResult> for ToolOutcome {
    fn from(result: ToolResult) -> Self {
        match result {
            Ok(output) => ToolOutcome::Success {
                data: output.data,
                source_urls: output.source_urls,
            },
            Err(err) => ToolOutcome::Failure {
                message: err.reason().into_owned(),
            },
        }
    }
}

type ProgressFn = Arc<dyn Fn(String) + Send + Sync>;

/// Capabilities handed to a tool for one invocation.
#[derive(Clone)]
pub struct ToolContext {
    credentials: Arc<dyn CredentialResolver>,
    cancellation: CancellationToken,
    progress: Option<ProgressFn>,
}

impl ToolContext {
    /// Creates a context with the given credentials.
    #[inline]
    pub fn new(credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            credentials,
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }

    /// Sets the token signaled when the run is cancelled.
    #[inline]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Sets the progress callback.
    #[inline]
    pub fn with_progress(
        mut self,
        progress: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Returns the credentials available to the tool.
    #[inline]
    pub fn credentials(&self) -> &Arc<dyn CredentialResolver> {
        &self.credentials
    }

    /// Returns the run's cancellation token.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Reports a progress message to whoever is watching the run.
    #[inline]
    pub fn report_progress<S: Into<String>>(&self, message: S) {
        if let Some(progress) = &self.progress {
            progress(message.into());
        }
    }
}

impl Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// Arguments requested by the model are validated by deserializing them into
/// [`Tool::Input`]; a failure there never reaches [`Tool::execute`].
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned + Send + 'static;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Describes the call for the approval prompt.
    fn make_approval(&self, _input: &Self::Input) -> Approval {
        Approval::new(self.name(), "Agent wants to call this tool")
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_outcome_from_result() {
        let ok: ToolResult = Ok(ToolOutput::new(json!({ "price": 1.5 }))
            .with_source_urls(vec!["https://data.example/quote".to_owned()]));
        assert_eq!(
            ToolOutcome::from(ok),
            ToolOutcome::Success {
                data: json!({ "price": 1.5 }),
                source_urls: vec!["https://data.example/quote".to_owned()],
            }
        );

        let err: ToolResult = Err(Error::not_found());
        assert_eq!(ToolOutcome::from(err), ToolOutcome::failure("tool not found"));
    }

    #[tokio::test]
    async fn test_outcome_from_panicked_task() {
        let handle = tokio::spawn(async {
            if true {
                panic!("boom");
            }
            Ok(ToolOutput::default())
        });
        let outcome = ToolOutcome::from_join(handle.await);
        assert_eq!(outcome, ToolOutcome::failure("tool panicked"));
    }
}
