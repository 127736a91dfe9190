// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "loom",
    about = "Tool-calling agents with bounded steps and per-thread memory",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (layered over the auto-discovered ones)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt to an agent and print its answer.
    ///
    /// Progress is written to stderr, the answer to stdout.  Exits with
    /// status 2 when the step budget runs out or the run times out.
    Run {
        /// Agent profile to use (see `loom agents`)
        #[arg(long, short = 'a', env = "LOOM_AGENT")]
        agent: Option<String>,

        /// Resource (user or project) owning the thread
        #[arg(long, short = 'r', default_value = "default", env = "LOOM_RESOURCE")]
        resource: String,

        /// Thread to continue; a new one is started when omitted
        #[arg(long, short = 't')]
        thread: Option<String>,

        /// Maximum number of model invocations
        #[arg(long, value_name = "N")]
        max_steps: Option<u32>,

        /// Wall-clock limit for the run in seconds (0 = no limit)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// The user message
        #[arg(value_name = "PROMPT", required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Print the messages stored for a thread
    History {
        #[arg(long, short = 'r', default_value = "default", env = "LOOM_RESOURCE")]
        resource: String,

        #[arg(long, short = 't')]
        thread: String,

        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List the threads stored for a resource
    Threads {
        #[arg(long, short = 'r', default_value = "default", env = "LOOM_RESOURCE")]
        resource: String,
    },
    /// List available agent profiles
    Agents,
    /// Print the effective configuration and exit
    ShowConfig,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "loom", &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_joins_prompt_words_and_reads_overrides() {
        let cli = Cli::try_parse_from([
            "loom", "-v", "run", "--agent", "code-generation", "--thread", "t1",
            "--max-steps", "3", "write", "hello.txt",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run { agent, thread, max_steps, prompt, resource, timeout } => {
                assert_eq!(agent.as_deref(), Some("code-generation"));
                assert_eq!(thread.as_deref(), Some("t1"));
                assert_eq!(max_steps, Some(3));
                assert_eq!(prompt.join(" "), "write hello.txt");
                assert_eq!(resource, "default");
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn history_requires_thread() {
        assert!(Cli::try_parse_from(["loom", "history"]).is_err());
        assert!(Cli::try_parse_from(["loom", "history", "--thread", "t", "--json"]).is_ok());
    }
}
