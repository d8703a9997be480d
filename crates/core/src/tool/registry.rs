use std::collections::BTreeMap;
use std::sync::Arc;

use finscout_model::ModelTool;
use serde_json::Value;

use super::object::{ToolObject, ToolObjectImpl};
use super::{Error, Tool, ToolContext, ToolOutcome};

/// A closed mapping from tool name to tool, built once per run.
///
/// Registering a tool under a name that is already taken replaces the
/// earlier one.
#[derive(Clone, Default)]
pub struct Registry {
    tools: BTreeMap<String, Arc<dyn ToolObject>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Arc::new(ToolObjectImpl(tool)));
    }

    /// Registers a tool, builder style.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Returns `true` if a tool named `name` is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the registered tool names in order.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the tool definitions to bind to a model request, ordered by
    /// name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    #[inline]
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn ToolObject>> {
        self.tools.get(name)
    }

    /// Invokes a tool directly, without any approval policy.
    ///
    /// Unknown names, invalid arguments, failures and panics all come back
    /// as [`ToolOutcome::Failure`]; the returned future never fails.
    pub fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolOutcome> + Send + 'static {
        let prepared = match self.get(name) {
            Some(tool) => Arc::clone(tool).prepare(arguments),
            None => {
                warn!("tool not found: {name}");
                Err(Error::not_found())
            }
        };
        let name = name.to_owned();
        async move {
            match prepared {
                Ok(call) => ToolOutcome::from_join(call.task.spawn(&name, ctx).await),
                Err(err) => ToolOutcome::from(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::credentials::Credentials;
    use crate::tool::{ToolOutput, ToolResult};

    #[derive(Deserialize)]
    struct EchoInput {
        ticker: String,
    }

    struct EchoTool {
        schema: Value,
    }

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo_ticker"
        }

        fn description(&self) -> &str {
            "Echoes the ticker"
        }

        fn parameter_schema(&self) -> &Value {
            &self.schema
        }

        fn execute(
            &self,
            input: Self::Input,
            _ctx: ToolContext,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(ToolOutput::new(json!({ "ticker": input.ticker }))))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(Credentials::new()))
    }

    #[test]
    fn test_definitions() {
        let registry = Registry::new().with_tool(EchoTool {
            schema: json!({ "type": "object" }),
        });
        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "echo_ticker");
        assert_eq!(definitions[0].parameters, json!({ "type": "object" }));
        assert!(registry.contains("echo_ticker"));
    }

    #[tokio::test]
    async fn test_invoke() {
        let registry = Registry::new().with_tool(EchoTool { schema: json!({}) });

        let outcome = registry
            .invoke("echo_ticker", json!({ "ticker": "TCS.BSE" }), ctx())
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::Success {
                data: json!({ "ticker": "TCS.BSE" }),
                source_urls: vec![],
            }
        );

        let outcome = registry.invoke("missing", json!({}), ctx()).await;
        assert_eq!(outcome, ToolOutcome::failure("tool not found"));

        let outcome = registry
            .invoke("echo_ticker", json!({ "symbol": 1 }), ctx())
            .await;
        let ToolOutcome::Failure { message } = outcome else {
            panic!("expected a validation failure");
        };
        assert!(message.starts_with("invalid input"));
    }
}
