//! Per-run working memory.
//!
//! A [`RunContext`] is created when a run starts and dropped when it ends.
//! Its [`Scratchpad`] is append-only: records and thoughts keep insertion
//! order and are never removed or rewritten.

use std::collections::HashSet;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use finscout_model::{TokenUsage, ToolCallRequest};
use serde::Serialize;

use crate::tool::ToolOutcome;

const MAX_RENDERED_PAYLOAD: usize = 64 * 1024;

/// An immutable record of one tool call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallRecord {
    request: ToolCallRequest,
    outcome: ToolOutcome,
    iteration: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// Creates a record.
    #[inline]
    pub fn new(
        request: ToolCallRequest,
        outcome: ToolOutcome,
        iteration: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            outcome,
            iteration,
            started_at,
            finished_at,
        }
    }

    /// Returns the request as the model issued it.
    #[inline]
    pub fn request(&self) -> &ToolCallRequest {
        &self.request
    }

    /// Returns the outcome of the call.
    #[inline]
    pub fn outcome(&self) -> &ToolOutcome {
        &self.outcome
    }

    /// Returns the iteration that issued the call.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Returns when the call was dispatched.
    #[inline]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the outcome was known.
    #[inline]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}

/// Ordered tool records and thinking fragments of a run.
#[derive(Clone, Debug, Default)]
pub struct Scratchpad {
    records: Vec<ToolCallRecord>,
    thoughts: Vec<String>,
    soft_limit: usize,
}

impl Scratchpad {
    /// Creates an empty scratchpad. Tools called `soft_limit` times are
    /// flagged in the usage summary; `0` disables the flag.
    #[inline]
    pub fn new(soft_limit: usize) -> Self {
        Self {
            records: vec![],
            thoughts: vec![],
            soft_limit,
        }
    }

    /// Appends a fragment of model reasoning. Blank text is ignored.
    pub fn add_thinking<S: Into<String>>(&mut self, text: S) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.thoughts.push(text);
    }

    /// Appends a tool call record.
    #[inline]
    pub fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.records.push(record);
    }

    /// Returns every record in insertion order.
    #[inline]
    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    /// Returns every thinking fragment in insertion order.
    #[inline]
    pub fn thoughts(&self) -> &[String] {
        &self.thoughts
    }

    /// Renders every record as text for the next model prompt.
    pub fn render_tool_results_for_prompt(&self) -> String {
        if self.records.is_empty() {
            return "No data has been gathered yet.".to_owned();
        }

        let mut out = String::new();
        for (idx, record) in self.records.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            let request = &record.request;
            writeln!(
                out,
                "### {}. {} (iteration {})",
                idx + 1,
                request.name,
                record.iteration
            )
            .ok();
            writeln!(out, "Arguments: {}", request.arguments).ok();
            match &record.outcome {
                ToolOutcome::Success { data, source_urls } => {
                    writeln!(out, "Result: {}", truncated(data.to_string())).ok();
                    if !source_urls.is_empty() {
                        writeln!(out, "Sources: {}", source_urls.join(", ")).ok();
                    }
                }
                ToolOutcome::Failure { message } => {
                    writeln!(out, "Error: {message}").ok();
                }
            }
        }
        out
    }

    /// Renders how often each tool has been called so far, in first-use
    /// order.
    pub fn render_tool_usage_summary_for_prompt(&self) -> String {
        let mut counts: Vec<(&str, usize)> = vec![];
        for record in &self.records {
            let name = record.request.name.as_str();
            match counts.iter_mut().find(|(tool, _)| *tool == name) {
                Some((_, count)) => *count += 1,
                None => counts.push((name, 1)),
            }
        }
        if counts.is_empty() {
            return "No tools have been called yet.".to_owned();
        }

        let mut out = String::new();
        for (tool, count) in counts {
            write!(out, "- {tool}: {count} call(s)").ok();
            if self.soft_limit > 0 && count >= self.soft_limit {
                out.push_str(
                    " (limit reached; answer with the data you already have)",
                );
            }
            out.push('\n');
        }
        out
    }
}

fn truncated(mut text: String) -> String {
    if text.len() <= MAX_RENDERED_PAYLOAD {
        return text;
    }
    let mut cut = MAX_RENDERED_PAYLOAD;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let omitted = text.len() - cut;
    text.truncate(cut);
    write!(text, "... [truncated {omitted} bytes]").ok();
    text
}

/// Mutable state of a single run.
#[derive(Debug)]
pub struct RunContext {
    query: String,
    iteration: usize,
    scratchpad: Scratchpad,
    approved_tools: HashSet<String>,
    token_usage: Option<TokenUsage>,
}

impl RunContext {
    /// Creates the context for `query`. `approved_tools` seeds the set of
    /// tools that skip approval for the whole run.
    pub fn new<S: Into<String>>(
        query: S,
        approved_tools: HashSet<String>,
        soft_limit: usize,
    ) -> Self {
        Self {
            query: query.into(),
            iteration: 0,
            scratchpad: Scratchpad::new(soft_limit),
            approved_tools,
            token_usage: None,
        }
    }

    /// Returns the user query.
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the current iteration, `0` before the first one.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub(crate) fn next_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    /// Returns the scratchpad.
    #[inline]
    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    /// Returns the scratchpad for appending.
    #[inline]
    pub fn scratchpad_mut(&mut self) -> &mut Scratchpad {
        &mut self.scratchpad
    }

    /// Returns `true` if `tool` was approved for the rest of the run.
    #[inline]
    pub fn is_approved(&self, tool: &str) -> bool {
        self.approved_tools.contains(tool)
    }

    /// Approves `tool` for the rest of the run.
    #[inline]
    pub fn approve_for_session<S: Into<String>>(&mut self, tool: S) {
        self.approved_tools.insert(tool.into());
    }

    /// Returns the token usage summed so far, if any call reported it.
    #[inline]
    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.token_usage
    }

    /// Adds the usage reported by one model call.
    pub fn add_usage(&mut self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            *self.token_usage.get_or_insert_default() += usage;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(name: &str, args: serde_json::Value, outcome: ToolOutcome, iteration: usize) -> ToolCallRecord {
        let now = Utc::now();
        ToolCallRecord::new(
            ToolCallRequest {
                id: format!("call_{name}"),
                name: name.to_owned(),
                arguments: args,
            },
            outcome,
            iteration,
            now,
            now,
        )
    }

    fn success(data: serde_json::Value) -> ToolOutcome {
        ToolOutcome::Success {
            data,
            source_urls: vec!["https://data.example/prices?ticker=AAPL".to_owned()],
        }
    }

    #[test]
    fn test_render_tool_results() {
        let mut pad = Scratchpad::new(3);
        assert_eq!(
            pad.render_tool_results_for_prompt(),
            "No data has been gathered yet."
        );

        pad.record_tool_call(record(
            "financial_search",
            json!({ "query": "AAPL price" }),
            success(json!({ "price": 190.1 })),
            1,
        ));
        pad.record_tool_call(record(
            "web_search",
            json!({ "query": "AAPL news" }),
            ToolOutcome::failure("rate limited"),
            1,
        ));

        let rendered = pad.render_tool_results_for_prompt();
        assert_eq!(
            rendered,
            "### 1. financial_search (iteration 1)\n\
             Arguments: {\"query\":\"AAPL price\"}\n\
             Result: {\"price\":190.1}\n\
             Sources: https://data.example/prices?ticker=AAPL\n\
             \n\
             ### 2. web_search (iteration 1)\n\
             Arguments: {\"query\":\"AAPL news\"}\n\
             Error: rate limited\n"
        );
        // Rendering has no side effects.
        assert_eq!(pad.render_tool_results_for_prompt(), rendered);
    }

    #[test]
    fn test_render_truncates_large_payloads() {
        let mut pad = Scratchpad::new(3);
        let big = "x".repeat(MAX_RENDERED_PAYLOAD * 2);
        pad.record_tool_call(record("get_prices", json!({}), success(json!(big)), 1));

        let rendered = pad.render_tool_results_for_prompt();
        assert!(rendered.len() < MAX_RENDERED_PAYLOAD + 1024);
        assert!(rendered.contains("[truncated "));
    }

    #[test]
    fn test_usage_summary() {
        let mut pad = Scratchpad::new(2);
        assert_eq!(
            pad.render_tool_usage_summary_for_prompt(),
            "No tools have been called yet."
        );

        for _ in 0..2 {
            pad.record_tool_call(record(
                "web_search",
                json!({}),
                ToolOutcome::failure("x"),
                1,
            ));
        }
        pad.record_tool_call(record("financial_search", json!({}), success(json!(1)), 2));

        assert_eq!(
            pad.render_tool_usage_summary_for_prompt(),
            "- web_search: 2 call(s) (limit reached; answer with the data you already have)\n\
             - financial_search: 1 call(s)\n"
        );
    }

    #[test]
    fn test_blank_thinking_is_ignored() {
        let mut pad = Scratchpad::default();
        pad.add_thinking("  ");
        pad.add_thinking("Compare margins next.");
        assert_eq!(pad.thoughts(), ["Compare margins next."]);
    }

    #[test]
    fn test_run_context_usage() {
        let mut ctx = RunContext::new("q", HashSet::new(), 3);
        ctx.add_usage(None);
        assert_eq!(ctx.token_usage(), None);
        ctx.add_usage(Some(TokenUsage {
            input_tokens: 3,
            output_tokens: 1,
            total_tokens: 4,
        }));
        assert_eq!(ctx.token_usage().unwrap().total_tokens, 4);
        assert_eq!(ctx.next_iteration(), 1);
    }
}
