use chrono::Utc;
use finscout_model::ModelMessage;

use crate::conversation::Turn;
use crate::scratchpad::RunContext;

/// Prepended to the answer of a run that ran out of iterations.
pub const BUDGET_EXHAUSTED_NOTE: &str = "Note: the iteration budget was \
exhausted before a final answer was produced. Below is everything the tools \
returned so far.";

pub(crate) fn default_system_prompt() -> String {
    format!(
        "You are finscout, a research assistant for financial questions.\n\
         Current date: {}\n\
         \n\
         Use the available tools to gather market data, financial statements \
         and news before answering. Prefer a single call that covers several \
         companies over many narrow calls. Never invent figures: every number \
         in your answer must come from tool results. Cite the sources you used.\n\
         \n\
         When the gathered data is sufficient, reply with the final answer \
         and do not call any more tools.",
        Utc::now().format("%Y-%m-%d")
    )
}

/// Builds the messages of one iteration: the system prompt, prior turns
/// verbatim, then the message describing the current iteration.
pub(crate) fn build_messages(
    system_prompt: &str,
    turns: &[Turn],
    ctx: &RunContext,
) -> Vec<ModelMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ModelMessage::System(system_prompt.to_owned()));
    messages.extend(turns.iter().map(Turn::to_message));
    messages.push(ModelMessage::User(iteration_message(ctx)));
    messages
}

fn iteration_message(ctx: &RunContext) -> String {
    if ctx.iteration() <= 1 {
        return format!("Query: {}", ctx.query());
    }

    let scratchpad = ctx.scratchpad();
    format!(
        "Query: {}\n\
         \n\
         ## Data gathered so far\n\
         \n\
         {}\n\
         ## Tool usage\n\
         \n\
         {}\n\
         Answer the query if the data above is sufficient. Otherwise call \
         only the tools you still need.",
        ctx.query(),
        scratchpad.render_tool_results_for_prompt(),
        scratchpad.render_tool_usage_summary_for_prompt(),
    )
}

pub(crate) fn budget_exhausted_answer(ctx: &RunContext) -> String {
    format!(
        "{BUDGET_EXHAUSTED_NOTE}\n\n{}",
        ctx.scratchpad().render_tool_results_for_prompt()
    )
}
