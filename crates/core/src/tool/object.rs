use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{Approval, Error, Tool, ToolContext, ToolResult};

pub(crate) type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A validated call, along with what its approval prompt shows.
pub(crate) struct PreparedCall {
    pub approval: Approval,
    pub task: ToolTask,
}

/// A tool call that is ready to run.
pub(crate) struct ToolTask {
    run: Box<dyn FnOnce(ToolContext) -> BoxedToolFuture + Send>,
}

impl ToolTask {
    /// Spawns the call onto its own task. Panics surface as a `JoinError`.
    pub fn spawn(self, tool: &str, ctx: ToolContext) -> JoinHandle<ToolResult> {
        let fut = (self.run)(ctx);
        tokio::spawn(fut.instrument(debug_span!("tool execute", tool)))
    }
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    /// Validates `arguments` against the tool's input type.
    fn prepare(self: Arc<Self>, arguments: Value) -> Result<PreparedCall, Error>;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn prepare(self: Arc<Self>, arguments: Value) -> Result<PreparedCall, Error> {
        let input: T::Input = serde_json::from_value(arguments)
            .map_err(|err| Error::invalid_input().with_reason(format!("invalid input: {err}")))?;
        let approval = self.0.make_approval(&input);
        Ok(PreparedCall {
            approval,
            task: ToolTask {
                run: Box::new(move |ctx| Box::pin(self.0.execute(input, ctx))),
            },
        })
    }
}
