//! Tools the model can call, and how they are assembled into a registry.

mod finance;
mod router;
#[cfg(test)]
mod testing;
mod web_search;

use std::sync::Arc;

use finscout_core::ModelClient;
use finscout_core::credentials::CredentialResolver;
use finscout_core::tool::Registry;

pub use finance::{
    DataParameters, DataTool, Interval, NewsParameters, Period,
    PriceHistoryParameters, StatementParameters, TickerParameters,
    balance_sheets, cash_flow_statements, company_news, financial_tools,
    income_statements, price_history, price_snapshot,
};
pub use router::{FINANCIAL_SEARCH, FinancialSearch, FinancialSearchParameters};
pub use web_search::{WebSearchParameters, WebSearchTool};

use crate::data::{DataSource, FINANCIAL_DATA_API_KEY, SEARCH_API_KEY};

/// The remote sources tools are backed by.
#[derive(Clone)]
pub struct ToolBackends {
    /// Market data and financial statements.
    pub financial: Arc<dyn DataSource>,
    /// Web search.
    pub search: Arc<dyn DataSource>,
}

/// Builds the registry of one run.
///
/// `financial_search` is always present. Its data tools run degraded when
/// [`FINANCIAL_DATA_API_KEY`] is missing, and `web_search` is left out
/// when [`SEARCH_API_KEY`] is missing.
pub fn build_registry(
    model_client: ModelClient,
    credentials: &dyn CredentialResolver,
    backends: &ToolBackends,
) -> Registry {
    let financial = if credentials.has_credential(FINANCIAL_DATA_API_KEY) {
        Some(Arc::clone(&backends.financial))
    } else {
        info!("{FINANCIAL_DATA_API_KEY} is not configured, financial data is unavailable");
        None
    };

    let mut registry = Registry::new()
        .with_tool(FinancialSearch::new(model_client, financial_tools(financial)));
    if credentials.has_credential(SEARCH_API_KEY) {
        registry.add_tool(WebSearchTool::new(Arc::clone(&backends.search)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use finscout_core::credentials::Credentials;
    use finscout_core::tool::{ToolContext, ToolOutcome};
    use finscout_core::{AgentBuilder, AgentEvent};
    use finscout_model::ToolCallRequest;
    use finscout_test_model::{PresetEvent, PresetResponse, TestModelProvider};
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use super::testing::FakeSource;

    fn backends() -> ToolBackends {
        ToolBackends {
            financial: Arc::new(
                FakeSource::new()
                    .with_response("prices/snapshot", json!({ "price": 2890.5 })),
            ),
            search: Arc::new(FakeSource::new()),
        }
    }

    fn names(registry: &Registry) -> Vec<String> {
        registry.names().map(str::to_owned).collect()
    }

    #[test]
    fn test_web_search_requires_key() {
        let model_client = ModelClient::new(TestModelProvider::default());

        let registry =
            build_registry(model_client.clone(), &Credentials::new(), &backends());
        assert_eq!(names(&registry), ["financial_search"]);

        let credentials = Credentials::new().with(SEARCH_API_KEY, "search-test");
        let registry = build_registry(model_client, &credentials, &backends());
        assert_eq!(names(&registry), ["financial_search", "web_search"]);
    }

    #[tokio::test]
    async fn test_degraded_financial_search() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::ToolCall(ToolCallRequest {
                id: "r1".to_owned(),
                name: "get_price_snapshot".to_owned(),
                arguments: json!({ "ticker": "AAPL" }),
            }),
        ]));
        let registry = build_registry(
            ModelClient::new(provider),
            &Credentials::new(),
            &backends(),
        );

        let outcome = registry
            .invoke(
                FINANCIAL_SEARCH,
                json!({ "query": "AAPL price" }),
                ToolContext::new(Arc::new(Credentials::new())),
            )
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::Success {
                data: json!({
                    "get_price_snapshot_error":
                        "get_price_snapshot is unavailable: FINANCIAL_DATA_API_KEY is not configured"
                }),
                source_urls: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_agent_with_financial_search() {
        // The agent and the router share one scripted model: the agent's
        // first call, the router's call, then the agent's final answer.
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_1".to_owned(),
                name: FINANCIAL_SEARCH.to_owned(),
                arguments: json!({ "query": "price of RELIANCE.BSE" }),
            }),
        ]));
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::ToolCall(ToolCallRequest {
                id: "r1".to_owned(),
                name: "get_price_snapshot".to_owned(),
                arguments: json!({ "ticker": "RELIANCE.BSE" }),
            }),
        ]));
        provider.add_assistant_response_step(PresetResponse::with_text(
            "RELIANCE.BSE last traded at 2890.5.",
        ));

        let credentials: Arc<dyn CredentialResolver> =
            Arc::new(Credentials::new().with(FINANCIAL_DATA_API_KEY, "fd-test"));
        let model_client = ModelClient::new(provider);
        let registry = build_registry(model_client.clone(), &*credentials, &backends());
        let agent = AgentBuilder::with_model_client(model_client)
            .with_registry(registry)
            .with_credentials(credentials)
            .build();

        let events: Vec<_> = agent.run("price of RELIANCE.BSE", None).collect().await;
        let Some(AgentEvent::Done {
            answer,
            tool_calls,
            iterations,
            ..
        }) = events.last()
        else {
            panic!("expected a done event, got {events:?}");
        };
        assert_eq!(*iterations, 2);
        assert_eq!(answer, "RELIANCE.BSE last traded at 2890.5.");
        assert_eq!(
            tool_calls[0].outcome(),
            &ToolOutcome::Success {
                data: json!({ "get_price_snapshot_RELIANCE.BSE": { "price": 2890.5 } }),
                source_urls: vec!["https://data.example/prices/snapshot".to_owned()],
            }
        );
    }
}
