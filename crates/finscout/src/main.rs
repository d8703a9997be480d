//! An interactive terminal front end for `finscout`.

#[macro_use]
extern crate tracing;

use std::collections::HashSet;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use finscout::core::tool::{Approval, ToolOutcome};
use finscout::core::{AgentEvent, CancellationToken, EventStream};
use finscout::{Session, SessionBuilder, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    info!(
        "using {} model {}",
        settings.model_provider, settings.model
    );
    let mut session = SessionBuilder::new(settings).build();

    let Ok(progress_style) = ProgressStyle::with_template("{spinner} {wide_msg}")
    else {
        return;
    };
    let progress_style = progress_style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let mut approved_tools = HashSet::new();
    let mut interrupts = listen_for_interrupts();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        // Ctrl-C at the prompt exits.
        let line = select! {
            line = read_line() => line,
            _ = interrupts.recv() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let query = line.trim();
        match query {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                session.clear_history();
                approved_tools.clear();
                println!("History cleared.\n");
                continue;
            }
            _ => {}
        }

        let Some(answer) = run_query(
            &session,
            query,
            &progress_style,
            &mut approved_tools,
            &mut interrupts,
        )
        .await
        else {
            continue;
        };
        session.record_exchange(query, &answer);
    }
}

/// Runs one query to completion, returning the answer on success.
async fn run_query(
    session: &Session,
    query: &str,
    progress_style: &ProgressStyle,
    approved_tools: &mut HashSet<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Option<String> {
    let (approval_tx, mut approval_rx) = mpsc::unbounded_channel();
    let cancellation = CancellationToken::new();

    let mut config = session
        .default_config()
        .with_cancellation(cancellation.clone())
        .with_approval(Arc::new(move |approval: Approval| {
            approval_tx.send(approval).ok();
        }));
    for tool in approved_tools.iter() {
        config = config.with_session_approved_tool(tool);
    }

    let mut events = session.ask(query, config);
    drive_events(
        &mut events,
        &mut approval_rx,
        progress_style,
        approved_tools,
        interrupts,
        &cancellation,
    )
    .await
}

/// Installs the process-wide Ctrl-C handler once. Each signal is forwarded
/// to whoever is waiting: the prompt or the running query.
fn listen_for_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

async fn drive_events(
    events: &mut EventStream,
    approvals: &mut mpsc::UnboundedReceiver<Approval>,
    progress_style: &ProgressStyle,
    approved_tools: &mut HashSet<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    cancellation: &CancellationToken,
) -> Option<String> {
    let mut progress_bar: Option<ProgressBar> = None;
    let mut status = "🤔 Thinking...".to_owned();

    loop {
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar
            })
            .set_message(status.clone());
        if let Some(progress_bar) = &progress_bar {
            progress_bar.inc(1);
        }

        let sleep = sleep(Duration::from_millis(100));
        select! {
            Some(approval) = approvals.recv() => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                ask_for_approval(approval, approved_tools, interrupts, cancellation).await;
            }
            Some(()) = interrupts.recv() => {
                status = "🛑 Cancelling...".to_owned();
                cancellation.cancel();
            }
            event = events.recv() => {
                let Some(event) = event else {
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    return None;
                };
                match event {
                    AgentEvent::Thinking { message } => {
                        status = format!("🤔 {message}");
                    }
                    AgentEvent::ToolStart { tool, .. } => {
                        status = format!("🔧 Running {tool}...");
                    }
                    AgentEvent::ToolProgress { tool, message, .. } => {
                        status = format!("🔧 {tool}: {message}");
                    }
                    AgentEvent::ToolEnd { tool, result, duration_ms, .. } => {
                        if let Some(progress_bar) = &progress_bar {
                            progress_bar.suspend(|| print_tool_end(&tool, &result, duration_ms));
                        }
                    }
                    AgentEvent::Done { answer, iterations, total_time_ms, token_usage, .. } => {
                        if let Some(progress_bar) = progress_bar.take() {
                            progress_bar.finish_and_clear();
                        }
                        println!("{}🤖 {}", BAR_CHAR.bright_cyan(), answer.bright_white());
                        let tokens = token_usage
                            .map(|usage| format!(", {} tokens", usage.total_tokens))
                            .unwrap_or_default();
                        println!(
                            "{}\n",
                            format!("({iterations} iteration(s), {total_time_ms} ms{tokens})").dimmed()
                        );
                        return Some(answer);
                    }
                    AgentEvent::Error { error } => {
                        if let Some(progress_bar) = progress_bar.take() {
                            progress_bar.finish_and_clear();
                        }
                        println!("{}❌ {}\n", BAR_CHAR.bright_red(), error.bright_red());
                        return None;
                    }
                }
            }
            _ = sleep => {}
        }
    }
}

async fn ask_for_approval(
    approval: Approval,
    approved_tools: &mut HashSet<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    cancellation: &CancellationToken,
) {
    let bar = BAR_CHAR.bright_yellow();
    println!("\n{bar}⚠️  {} wants to: {}", approval.tool(), approval.what().bright_white().bold());
    if !approval.justification().is_empty() {
        println!("{bar}{}", approval.justification().dimmed());
    }
    print!("Proceed? [y/N/a(lways)]: ");
    std::io::stdout().flush().ok();

    let line = select! {
        line = read_line() => line,
        _ = interrupts.recv() => {
            println!();
            cancellation.cancel();
            None
        }
    };
    let Some(line) = line else {
        approval.reject(None);
        return;
    };
    let line = line.trim();
    if line.eq_ignore_ascii_case("y") {
        approval.approve();
    } else if line.eq_ignore_ascii_case("a") {
        approved_tools.insert(approval.tool().to_owned());
        approval.approve_for_session();
    } else {
        approval.reject(Some("declined by the user".to_owned()));
    }
    println!();
}

fn print_tool_end(tool: &str, result: &ToolOutcome, duration_ms: u64) {
    match result {
        ToolOutcome::Success { .. } => {
            println!("{}✔ {tool} {}", BAR_CHAR.bright_green(), format!("({duration_ms} ms)").dimmed());
        }
        ToolOutcome::Failure { message } => {
            println!("{}✘ {tool}: {}", BAR_CHAR.bright_red(), message.red());
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
