// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

/// `aria gateway` subcommands: process lifecycle and key management for the
/// HTTP/WebSocket/GraphQL transport.
#[derive(Subcommand, Debug)]
pub enum GatewayCommands {
    /// Start the gateway (HTTP + WebSocket + GraphQL).
    ///
    /// Loads configuration the same way every other command does, then
    /// blocks serving requests until Ctrl+C or SIGTERM. If no API key is
    /// configured and `gateway.production` is set, startup fails closed
    /// rather than serving unauthenticated.
    Start {
        /// Path to the config file (overrides auto-discovery).
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Regenerate the process API key.
    ///
    /// The previous key in the bootstrap environment file is discarded and
    /// a fresh one generated and printed once. Any client still using the
    /// old key is rejected on its next request.
    RegenerateToken {
        /// Path to the bootstrap environment file (defaults to the
        /// OS-appropriate config directory).
        #[arg(long, short = 'e')]
        env_file: Option<PathBuf>,
    },

    /// Print the effective gateway configuration and exit.
    ShowConfig {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "aria",
    about = "Aria cognitive core: chat sessions, LLM gateway, agent delegation, and scheduled skills",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (overrides auto-discovery).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// First-run setup: generate the API key and LLM master key and write
    /// them to the bootstrap environment file.
    ///
    /// Re-running against an existing environment file is a no-op that
    /// reprints the keys already on disk rather than rotating them.
    Bootstrap {
        /// Path to the bootstrap environment file (defaults to the
        /// OS-appropriate config directory, e.g. `~/.config/aria/aria.env`).
        #[arg(long, short = 'e')]
        env_file: Option<PathBuf>,
    },

    /// Start the gateway (HTTP + WebSocket + GraphQL). Equivalent to
    /// `aria gateway start`.
    Serve,

    /// Gateway process lifecycle and key management.
    Gateway {
        #[command(subcommand)]
        command: GatewayCommands,
    },

    /// Print the effective configuration and exit.
    ShowConfig,

    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
