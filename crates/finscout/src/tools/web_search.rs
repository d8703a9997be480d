use std::sync::Arc;

use finscout_core::tool::{
    Approval as ToolApproval, Error as ToolError, Tool, ToolContext, ToolOutput,
    ToolResult,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::data::{DataQuery, DataSource};

const DEFAULT_COUNT: u8 = 5;

/// Parameters of `web_search`.
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The search query.")]
    query: String,
    #[serde(default)]
    #[schemars(description = "Number of results to return, 1 to 20. Defaults to 5.")]
    count: Option<u8>,
}

/// A tool for searching the web, for questions the financial data tools
/// do not cover.
pub struct WebSearchTool {
    source: Arc<dyn DataSource>,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates the tool over a search source.
    #[inline]
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        r#"
Searches the web. Use it for recent events, analyst commentary and anything the financial data tools do not cover.
Returns titles, URLs and snippets of the top results."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> ToolApproval {
        ToolApproval::new(&input.query, "Agent wants to search the web")
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WebSearchParameters,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let source = Arc::clone(&self.source);
        async move {
            let count = input.count.unwrap_or(DEFAULT_COUNT).clamp(1, 20);
            let query = DataQuery::new("search")
                .param("q", &input.query)
                .param("count", count);
            let credentials = Arc::clone(ctx.credentials());
            let payload = source
                .fetch(query, &*credentials)
                .await
                .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
            Ok(summarize(&input.query, payload.data))
        }
    }
}

/// Keeps the fields of each result the model needs.
fn summarize(query: &str, body: Value) -> ToolOutput {
    let Some(results) = body.pointer("/web/results").and_then(Value::as_array) else {
        return ToolOutput::new(body);
    };

    let mut source_urls = vec![];
    let results: Vec<Value> = results
        .iter()
        .map(|result| {
            let url = result["url"].as_str().unwrap_or_default();
            if !url.is_empty() {
                source_urls.push(url.to_owned());
            }
            json!({
                "title": result["title"].as_str().unwrap_or_default(),
                "url": url,
                "snippet": result["description"].as_str().unwrap_or_default(),
            })
        })
        .collect();

    ToolOutput::new(json!({ "query": query, "results": results }))
        .with_source_urls(source_urls)
}
