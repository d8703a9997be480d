//! Tools shared by the unit tests of this crate.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;

use crate::credentials::{CredentialResolver, Credentials};
use crate::event::{self, AgentEvent, EventStream};
use crate::tool::{Approval, Error, Tool, ToolContext, ToolOutput, ToolResult};

#[derive(Deserialize)]
pub struct TickerInput {
    pub ticker: String,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Returns a fixed quote for the ticker after an optional delay.
pub struct QuoteTool {
    pub calls: Arc<AtomicUsize>,
    schema: Value,
}

impl QuoteTool {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            schema: json!({
                "type": "object",
                "properties": { "ticker": { "type": "string" } },
                "required": ["ticker"]
            }),
        }
    }
}

impl Tool for QuoteTool {
    type Input = TickerInput;

    fn name(&self) -> &str {
        "get_quote"
    }

    fn description(&self) -> &str {
        "Returns the latest quote for a ticker"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn make_approval(&self, input: &Self::Input) -> Approval {
        Approval::new(
            format!("Fetch the quote of {}", input.ticker),
            "Needs market data",
        )
    }

    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            ctx.report_progress(format!("fetching {}", input.ticker));
            if input.delay_ms > 0 {
                sleep(Duration::from_millis(input.delay_ms)).await;
            }
            Ok(ToolOutput::new(json!({ "ticker": input.ticker, "price": 100.0 }))
                .with_source_urls(vec![format!(
                    "https://data.example/quote?ticker={}",
                    input.ticker
                )]))
        }
    }
}

/// Always fails, or panics when asked to.
pub struct BrokenTool;

#[derive(Deserialize)]
pub struct BrokenInput {
    #[serde(default)]
    pub panic: bool,
}

impl Tool for BrokenTool {
    type Input = BrokenInput;

    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Never works"
    }

    fn parameter_schema(&self) -> &Value {
        static SCHEMA: OnceLock<Value> = OnceLock::new();
        SCHEMA.get_or_init(|| json!({ "type": "object" }))
    }

    fn execute(
        &self,
        input: Self::Input,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            if input.panic {
                panic!("broken tool panicked");
            }
            Err(Error::execution_error().with_reason("upstream returned 503"))
        }
    }
}

/// Waits until the run is cancelled.
pub struct HangingTool;

impl Tool for HangingTool {
    type Input = Value;

    fn name(&self) -> &str {
        "hanging"
    }

    fn description(&self) -> &str {
        "Never finishes on its own"
    }

    fn parameter_schema(&self) -> &Value {
        static SCHEMA: OnceLock<Value> = OnceLock::new();
        SCHEMA.get_or_init(|| json!({ "type": "object" }))
    }

    fn execute(
        &self,
        _input: Self::Input,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::default())
        }
    }
}

pub fn no_credentials() -> Arc<dyn CredentialResolver> {
    Arc::new(Credentials::new())
}

pub fn events() -> (event::EventSender, EventStream) {
    event::channel(256)
}

pub fn drain(stream: &mut EventStream) -> Vec<AgentEvent> {
    let mut out = vec![];
    while let Some(Some(event)) = stream.recv().now_or_never() {
        out.push(event);
    }
    out
}
