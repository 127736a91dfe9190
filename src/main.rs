// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use loom_bootstrap::Runtime;
use loom_core::{AgentEvent, RunOutcome};
use loom_memory::{StoredMessage, ThreadKey};
use loom_model::MessageContent;

/// Exit status for runs that stopped without a final answer.
const EXIT_INCOMPLETE: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Commands that need no runtime.
    match &cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            return Ok(());
        }
        Commands::ShowConfig => {
            let config = loom_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).context("serialising config")?);
            return Ok(());
        }
        Commands::Agents => {
            let config = loom_config::load(cli.config.as_deref())?;
            for (name, profile) in config.agent_profiles() {
                let marker = if name == config.agent.default_agent { "*" } else { " " };
                println!(
                    "{marker} {name:18} steps={:<3} tools={}  {}",
                    profile.effective_max_steps(&config.agent),
                    profile.tools.join(","),
                    profile.description
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let config = loom_config::load(cli.config.as_deref())?;
    let runtime = Runtime::from_config(config)?;

    match cli.command {
        Commands::Run { agent, resource, thread, max_steps, timeout, prompt } => {
            let thread = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let timeout = timeout.map(|secs| match secs {
                0 => None,
                s => Some(Duration::from_secs(s)),
            });
            let code = run(
                &runtime,
                agent.as_deref(),
                ThreadKey::new(resource, thread),
                max_steps,
                timeout,
                &prompt.join(" "),
            )
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::History { resource, thread, json } => {
            let key = ThreadKey::new(resource, thread);
            let messages = runtime.memory().read(&key).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for m in &messages {
                    println!("{}", format_stored(m));
                }
            }
            Ok(())
        }
        Commands::Threads { resource } => {
            for id in runtime.memory().threads(&resource).await? {
                println!("{id}");
            }
            Ok(())
        }
        Commands::Completions { .. } | Commands::ShowConfig | Commands::Agents => Ok(()),
    }
}

/// Run one prompt and return the process exit status.
///
/// `timeout` is `None` to use the configured limit, `Some(None)` to disable
/// it and `Some(Some(d))` to override it.
async fn run(
    runtime: &Runtime,
    agent_name: Option<&str>,
    scope: ThreadKey,
    max_steps: Option<u32>,
    timeout: Option<Option<Duration>>,
    prompt: &str,
) -> anyhow::Result<i32> {
    let agent = runtime.agent(agent_name)?;
    let mut run_config = runtime.run_config(agent_name, scope.clone(), max_steps, None)?;
    if let Some(t) = timeout {
        run_config.timeout = t;
    }
    write_stderr(&format!(
        "[loom:run] agent={} thread={} max_steps={}",
        agent.name(),
        scope,
        run_config.max_steps
    ));

    // ── Ctrl+C requests cancellation before the next step ────────────────
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(());
        } else {
            // Keep the sender alive: dropping it would read as a cancel.
            std::future::pending::<()>().await;
            drop(cancel_tx);
        }
    });

    let (tx, mut rx) = mpsc::channel::<AgentEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handle_event(event);
        }
    });

    let outcome = agent.run(prompt, &run_config, tx, cancel_rx).await;
    // The sender was moved into `run`; the printer drains and stops.
    let _ = printer.await;
    let outcome = outcome?;

    if !outcome.text().is_empty() {
        println!("{}", outcome.text());
    }
    let code = match &outcome {
        RunOutcome::FinalAnswer { .. } => 0,
        RunOutcome::BudgetExhausted { steps, .. } => {
            write_stderr(&format!("[loom:budget-exhausted] no final answer after {steps} steps"));
            EXIT_INCOMPLETE
        }
        RunOutcome::TimedOut { steps, .. } => {
            write_stderr(&format!("[loom:timeout] run timed out after {steps} steps"));
            EXIT_INCOMPLETE
        }
        RunOutcome::Cancelled { steps, .. } => {
            write_stderr(&format!("[loom:cancelled] after {steps} steps"));
            EXIT_CANCELLED
        }
    };
    Ok(code)
}

/// Write per-event diagnostics to stderr.
fn handle_event(event: AgentEvent) {
    match event {
        AgentEvent::StepStarted { step } => {
            write_stderr(&format!("[loom:step] {step}"));
        }
        AgentEvent::ToolCallStarted(tc) => {
            write_stderr(&format!(
                "[loom:tool:call] name=\"{}\" args={}",
                tc.name,
                serde_json::to_string(&tc.args).unwrap_or_default()
            ));
        }
        AgentEvent::ToolCallFinished { tool_name, output, is_error, .. } => {
            if is_error {
                write_stderr(&format!("[loom:tool:error] name=\"{tool_name}\" output={output:?}"));
            } else {
                write_stderr(&format!("[loom:tool:ok] name=\"{tool_name}\""));
            }
        }
        AgentEvent::TokenUsage { input, output } => {
            tracing::debug!(input, output, "token usage");
        }
        AgentEvent::Error(msg) => {
            write_stderr(&format!("[loom:model:warn] {msg}"));
        }
        AgentEvent::RunFinished(outcome) => {
            tracing::debug!(outcome = outcome.label(), steps = outcome.steps(), "run finished");
        }
        AgentEvent::TextDelta(_) | AgentEvent::TextComplete(_) | AgentEvent::StepFinished { .. } => {}
    }
}

fn format_stored(m: &StoredMessage) -> String {
    let ts = m.created_at.format("%Y-%m-%d %H:%M:%S");
    let role = m.message.role.as_str();
    let body = match &m.message.content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::ToolCall { tool_call_id, function } => {
            format!("call {} [{}] {}", function.name, tool_call_id, function.arguments)
        }
        MessageContent::ToolResult { tool_call_id, tool_name, content, is_error } => {
            let tag = if *is_error { "error" } else { "result" };
            format!("{tag} {tool_name} [{tool_call_id}] {content}")
        }
    };
    format!("#{:<4} {ts} {role:9} {body}", m.ordinal)
}

fn write_stderr(msg: &str) {
    eprintln!("{msg}");
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
