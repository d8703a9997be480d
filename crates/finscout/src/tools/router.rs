use chrono::Utc;
use finscout_core::ModelClient;
use finscout_core::model::{ModelMessage, ModelRequest, ToolCallRequest};
use finscout_core::tool::{
    Approval as ToolApproval, Error as ToolError, Registry, Tool, ToolContext,
    ToolOutcome, ToolOutput, ToolResult,
};
use futures::future::join_all;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Name of the meta-router tool.
pub const FINANCIAL_SEARCH: &str = "financial_search";

/// Parameters of `financial_search`.
#[derive(Deserialize, JsonSchema)]
pub struct FinancialSearchParameters {
    #[schemars(
        description = "The financial question in natural language, e.g. \
                       `Compare Apple and Microsoft revenue over the last 3 years`."
    )]
    query: String,
}

/// A tool that asks the model which financial data tools answer a query,
/// runs them concurrently and merges what they return.
pub struct FinancialSearch {
    model_client: ModelClient,
    tools: Registry,
    parameter_schema: Value,
}

impl FinancialSearch {
    /// Creates the router over `tools`.
    pub fn new(model_client: ModelClient, tools: Registry) -> Self {
        Self {
            model_client,
            tools,
            parameter_schema: schema_for!(FinancialSearchParameters).to_value(),
        }
    }
}

impl Tool for FinancialSearch {
    type Input = FinancialSearchParameters;

    fn name(&self) -> &str {
        FINANCIAL_SEARCH
    }

    fn description(&self) -> &str {
        r#"
Searches financial data for a natural language query. Covers price snapshots, historical prices, income statements, balance sheets, cash flow statements and company news.
Pass the whole question, one call can fetch data for several companies at once."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> ToolApproval {
        ToolApproval::new(&input.query, "Agent wants to search financial data")
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: FinancialSearchParameters,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let model_client = self.model_client.clone();
        let tools = self.tools.clone();
        async move {
            let request = ModelRequest {
                messages: vec![
                    ModelMessage::System(routing_prompt()),
                    ModelMessage::User(input.query.clone()),
                ],
                tools: tools.definitions(),
            };
            let resp = model_client.send_request(request).await.map_err(|err| {
                ToolError::execution_error().with_reason(format!("routing failed: {err}"))
            })?;

            if resp.tool_calls.is_empty() {
                debug!("no data tool selected for {:?}", input.query);
                return Ok(ToolOutput::new(json!({
                    "message": "No financial data tool matched the query. \
                                Try rephrasing it with a company name or ticker.",
                    "query": input.query,
                })));
            }

            let names: Vec<_> = resp.tool_calls.iter().map(|c| c.name.as_str()).collect();
            ctx.report_progress(format!("querying {}", names.join(", ")));

            let outcomes = join_all(resp.tool_calls.iter().map(|call| {
                tools.invoke(&call.name, call.arguments.clone(), ctx.clone())
            }))
            .await;
            Ok(merge(&resp.tool_calls, outcomes))
        }
    }
}

fn routing_prompt() -> String {
    format!(
        "You route financial questions to data tools.\n\
         Current date: {}\n\
         \n\
         Call every tool needed to answer the question, once per company \
         when several companies are involved. Use ticker symbols, resolving \
         company names to their primary listing. Resolve relative dates such \
         as \"last quarter\" or \"past 5 years\" against the current date. \
         Do not answer the question yourself.",
        Utc::now().format("%Y-%m-%d")
    )
}

/// Merges sub-tool outcomes into one payload.
///
/// Successes are keyed `{tool}` or `{tool}_{ticker}`, with a `_2`, `_3`...
/// suffix when the same key comes up again; failures are keyed
/// `{tool}_error`, joining messages when a tool fails more than once.
/// Source URLs keep their first occurrence only.
fn merge(calls: &[ToolCallRequest], outcomes: Vec<ToolOutcome>) -> ToolOutput {
    let mut data = Map::new();
    let mut source_urls: Vec<String> = vec![];

    for (call, outcome) in calls.iter().zip(outcomes) {
        match outcome {
            ToolOutcome::Success {
                data: value,
                source_urls: urls,
            } => {
                let key = unique_key(&data, merge_key(call));
                data.insert(key, value);
                for url in urls {
                    if !source_urls.contains(&url) {
                        source_urls.push(url);
                    }
                }
            }
            ToolOutcome::Failure { message } => {
                let key = format!("{}_error", call.name);
                let message = match data.get(&key).and_then(Value::as_str) {
                    Some(earlier) => format!("{earlier}; {message}"),
                    None => message,
                };
                data.insert(key, Value::String(message));
            }
        }
    }

    ToolOutput::new(Value::Object(data)).with_source_urls(source_urls)
}

fn unique_key(data: &Map<String, Value>, key: String) -> String {
    if !data.contains_key(&key) {
        return key;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{key}_{n}");
        if !data.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn merge_key(call: &ToolCallRequest) -> String {
    let primary = ["ticker", "symbol"]
        .iter()
        .find_map(|key| call.arguments.get(key).and_then(Value::as_str));
    match primary {
        Some(primary) => format!("{}_{primary}", call.name),
        None => call.name.clone(),
    }
}
