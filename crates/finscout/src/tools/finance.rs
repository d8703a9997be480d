use std::marker::PhantomData;
use std::sync::Arc;

use finscout_core::tool::{
    Approval as ToolApproval, Error as ToolError, Registry, Tool, ToolContext,
    ToolOutput, ToolResult,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::data::{DataQuery, DataSource, FINANCIAL_DATA_API_KEY};

/// Parameters of a data tool that know how to become a [`DataQuery`].
pub trait DataParameters: DeserializeOwned + JsonSchema + Send + 'static {
    /// Builds the query for `endpoint`.
    fn to_query(&self, endpoint: &str) -> DataQuery;

    /// The ticker the call is about.
    fn ticker(&self) -> &str;
}

/// Parameters of tools that only need a ticker.
#[derive(Deserialize, JsonSchema)]
pub struct TickerParameters {
    #[schemars(description = "Ticker symbol, e.g. `AAPL` or `RELIANCE.BSE`.")]
    ticker: String,
}

impl DataParameters for TickerParameters {
    fn to_query(&self, endpoint: &str) -> DataQuery {
        DataQuery::new(endpoint).param("ticker", &self.ticker)
    }

    fn ticker(&self) -> &str {
        &self.ticker
    }
}

/// Size of a price bar.
#[derive(Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// One trading day.
    #[default]
    Day,
    /// One week.
    Week,
    /// One month.
    Month,
    /// One year.
    Year,
}

impl Interval {
    fn as_str(self) -> &'static str {
        match self {
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
            Interval::Year => "year",
        }
    }
}

/// Parameters of `get_prices`.
#[derive(Deserialize, JsonSchema)]
pub struct PriceHistoryParameters {
    #[schemars(description = "Ticker symbol, e.g. `AAPL`.")]
    ticker: String,
    #[serde(default)]
    #[schemars(description = "Bar size, defaults to `day`.")]
    interval: Interval,
    #[schemars(description = "First day of the range, `YYYY-MM-DD`.")]
    start_date: String,
    #[schemars(description = "Last day of the range, `YYYY-MM-DD`.")]
    end_date: String,
}

impl DataParameters for PriceHistoryParameters {
    fn to_query(&self, endpoint: &str) -> DataQuery {
        DataQuery::new(endpoint)
            .param("ticker", &self.ticker)
            .param("interval", self.interval.as_str())
            .param("interval_multiplier", 1)
            .param("start_date", &self.start_date)
            .param("end_date", &self.end_date)
    }

    fn ticker(&self) -> &str {
        &self.ticker
    }
}

/// Reporting period of a financial statement.
#[derive(Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Fiscal years.
    #[default]
    Annual,
    /// Fiscal quarters.
    Quarterly,
    /// Trailing twelve months.
    Ttm,
}

impl Period {
    fn as_str(self) -> &'static str {
        match self {
            Period::Annual => "annual",
            Period::Quarterly => "quarterly",
            Period::Ttm => "ttm",
        }
    }
}

/// Parameters of the financial statement tools.
#[derive(Deserialize, JsonSchema)]
pub struct StatementParameters {
    #[schemars(description = "Ticker symbol, e.g. `AAPL`.")]
    ticker: String,
    #[serde(default)]
    #[schemars(description = "Reporting period, defaults to `annual`.")]
    period: Period,
    #[serde(default)]
    #[schemars(description = "Maximum number of statements to return.")]
    limit: Option<u32>,
}

impl DataParameters for StatementParameters {
    fn to_query(&self, endpoint: &str) -> DataQuery {
        DataQuery::new(endpoint)
            .param("ticker", &self.ticker)
            .param("period", self.period.as_str())
            .param_opt("limit", self.limit)
    }

    fn ticker(&self) -> &str {
        &self.ticker
    }
}

/// Parameters of `get_company_news`.
#[derive(Deserialize, JsonSchema)]
pub struct NewsParameters {
    #[schemars(description = "Ticker symbol, e.g. `AAPL`.")]
    ticker: String,
    #[serde(default)]
    #[schemars(description = "Maximum number of articles to return.")]
    limit: Option<u32>,
}

impl DataParameters for NewsParameters {
    fn to_query(&self, endpoint: &str) -> DataQuery {
        DataQuery::new(endpoint)
            .param("ticker", &self.ticker)
            .param_opt("limit", self.limit)
    }

    fn ticker(&self) -> &str {
        &self.ticker
    }
}

/// A tool backed by one endpoint of the financial data source.
///
/// Without a source the tool is still registered, but every call fails
/// with a message naming the missing credential.
pub struct DataTool<P> {
    name: &'static str,
    description: &'static str,
    endpoint: &'static str,
    parameter_schema: Value,
    source: Option<Arc<dyn DataSource>>,
    _parameters: PhantomData<fn() -> P>,
}

impl<P: DataParameters> DataTool<P> {
    fn new(
        name: &'static str,
        description: &'static str,
        endpoint: &'static str,
        source: Option<Arc<dyn DataSource>>,
    ) -> Self {
        Self {
            name,
            description,
            endpoint,
            parameter_schema: schema_for!(P).to_value(),
            source,
            _parameters: PhantomData,
        }
    }
}

impl<P: DataParameters> Tool for DataTool<P> {
    type Input = P;

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> ToolApproval {
        ToolApproval::new(
            format!("{} for {}", self.name, input.ticker()),
            "Agent wants to fetch financial data",
        )
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: P,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let name = self.name;
        let source = self.source.clone();
        let query = input.to_query(self.endpoint);
        async move {
            let Some(source) = source else {
                return Err(ToolError::unavailable().with_reason(format!(
                    "{name} is unavailable: {FINANCIAL_DATA_API_KEY} is not configured"
                )));
            };

            ctx.report_progress(format!("{name}: fetching {}", query.endpoint));
            let credentials = Arc::clone(ctx.credentials());
            let payload = source
                .fetch(query, &*credentials)
                .await
                .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
            Ok(ToolOutput::new(payload.data).with_source_urls(vec![payload.source_url]))
        }
    }
}

/// Latest price of a ticker.
pub fn price_snapshot(source: Option<Arc<dyn DataSource>>) -> DataTool<TickerParameters> {
    DataTool::new(
        "get_price_snapshot",
        "Fetches the latest price snapshot (price, day change, volume) of a ticker.",
        "prices/snapshot",
        source,
    )
}

/// Price bars of a ticker over a date range.
pub fn price_history(
    source: Option<Arc<dyn DataSource>>,
) -> DataTool<PriceHistoryParameters> {
    DataTool::new(
        "get_prices",
        "Fetches historical price bars (open, high, low, close, volume) of a \
         ticker between two dates.",
        "prices",
        source,
    )
}

/// Income statements of a company.
pub fn income_statements(
    source: Option<Arc<dyn DataSource>>,
) -> DataTool<StatementParameters> {
    DataTool::new(
        "get_income_statements",
        "Fetches income statements (revenue, gross profit, operating income, \
         net income, EPS) of a company.",
        "financials/income-statements",
        source,
    )
}

/// Balance sheets of a company.
pub fn balance_sheets(
    source: Option<Arc<dyn DataSource>>,
) -> DataTool<StatementParameters> {
    DataTool::new(
        "get_balance_sheets",
        "Fetches balance sheets (assets, liabilities, equity, cash, debt) of a \
         company.",
        "financials/balance-sheets",
        source,
    )
}

/// Cash flow statements of a company.
pub fn cash_flow_statements(
    source: Option<Arc<dyn DataSource>>,
) -> DataTool<StatementParameters> {
    DataTool::new(
        "get_cash_flow_statements",
        "Fetches cash flow statements (operating, investing and financing cash \
         flows, free cash flow) of a company.",
        "financials/cash-flow-statements",
        source,
    )
}

/// Recent news about a company.
pub fn company_news(source: Option<Arc<dyn DataSource>>) -> DataTool<NewsParameters> {
    DataTool::new(
        "get_company_news",
        "Fetches recent news articles about a company.",
        "news",
        source,
    )
}

/// Every financial data tool, backed by `source`, or degraded when it is
/// `None`.
pub fn financial_tools(source: Option<Arc<dyn DataSource>>) -> Registry {
    Registry::new()
        .with_tool(price_snapshot(source.clone()))
        .with_tool(price_history(source.clone()))
        .with_tool(income_statements(source.clone()))
        .with_tool(balance_sheets(source.clone()))
        .with_tool(cash_flow_statements(source.clone()))
        .with_tool(company_news(source))
}

#[cfg(test)]
mod tests {
    use finscout_core::credentials::Credentials;
    use finscout_core::tool::ToolOutcome;
    use serde_json::json;

    use super::*;
    use crate::tools::testing::FakeSource;

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(
            Credentials::new().with(FINANCIAL_DATA_API_KEY, "fd-test"),
        ))
    }

    #[test]
    fn test_registry_names() {
        let names: Vec<_> = financial_tools(None).names().map(str::to_owned).collect();
        assert_eq!(
            names,
            [
                "get_balance_sheets",
                "get_cash_flow_statements",
                "get_company_news",
                "get_income_statements",
                "get_price_snapshot",
                "get_prices",
            ]
        );
    }

    #[tokio::test]
    async fn test_degraded_tool() {
        let tools = financial_tools(None);
        let outcome = tools
            .invoke("get_price_snapshot", json!({ "ticker": "AAPL" }), ctx())
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::failure(
                "get_price_snapshot is unavailable: FINANCIAL_DATA_API_KEY is not configured"
            )
        );
    }

    #[tokio::test]
    async fn test_statement_query() {
        let source = Arc::new(FakeSource::new().with_response(
            "financials/income-statements",
            json!({ "income_statements": [{ "revenue": 391_035_000_000u64 }] }),
        ));
        let tools = financial_tools(Some(source.clone() as Arc<dyn DataSource>));

        let outcome = tools
            .invoke(
                "get_income_statements",
                json!({ "ticker": "AAPL", "limit": 2 }),
                ctx(),
            )
            .await;
        let ToolOutcome::Success { data, source_urls } = outcome else {
            panic!("expected a success, got {outcome:?}");
        };
        assert_eq!(data["income_statements"][0]["revenue"], json!(391_035_000_000u64));
        assert_eq!(
            source_urls,
            ["https://data.example/financials/income-statements"]
        );
        assert_eq!(
            source.queries(),
            [DataQuery::new("financials/income-statements")
                .param("ticker", "AAPL")
                .param("period", "annual")
                .param("limit", 2)]
        );
    }

    #[tokio::test]
    async fn test_invalid_period_is_rejected() {
        let source = Arc::new(FakeSource::new());
        let tools = financial_tools(Some(source.clone() as Arc<dyn DataSource>));

        let outcome = tools
            .invoke(
                "get_balance_sheets",
                json!({ "ticker": "AAPL", "period": "weekly" }),
                ctx(),
            )
            .await;
        assert!(!outcome.is_success());
        assert!(source.queries().is_empty());
    }

    #[tokio::test]
    async fn test_source_error_becomes_failure() {
        let source = Arc::new(FakeSource::new().with_error_status("news", 503));
        let tools = financial_tools(Some(source as Arc<dyn DataSource>));

        let outcome = tools
            .invoke("get_company_news", json!({ "ticker": "AAPL" }), ctx())
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::failure("https://data.example/news returned status 503")
        );
    }
}
