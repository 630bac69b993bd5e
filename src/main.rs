// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use clap::Parser;
use cli::{Cli, Commands, GatewayCommands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Bootstrap { env_file } => bootstrap_cmd(env_file.as_deref()),
        Commands::Serve => serve(cli.config.as_deref()).await,
        Commands::Gateway { command } => run_gateway_command(command, cli.config.as_deref()).await,
        Commands::ShowConfig => show_config(cli.config.as_deref()),
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
    }
}

/// First-run key generation: write (or reprint) the API key and LLM master
/// key, then exit. Mirrors the gateway's own fail-closed startup check —
/// an operator runs this once before ever setting `gateway.production`.
fn bootstrap_cmd(env_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let keys = aria_bootstrap::bootstrap_keys(env_file)?;
    if keys.generated {
        println!("Generated new Aria credentials in {}", keys.env_file.display());
    } else {
        println!("Existing Aria credentials found in {}", keys.env_file.display());
    }
    println!();
    println!("{}={}", aria_bootstrap::API_KEY_VAR, keys.api_key);
    println!("{}={}", aria_bootstrap::LLM_MASTER_KEY_VAR, keys.llm_master_key);
    println!();
    println!("Export these (or source the env file) before starting the gateway with `gateway.production: true`.");
    Ok(())
}

/// Load config and start the gateway, blocking until shutdown.
async fn serve(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = aria_config::load(config_path)?;
    aria_gateway::run(config).await
}

async fn run_gateway_command(cmd: GatewayCommands, top_level_config: Option<&std::path::Path>) -> anyhow::Result<()> {
    match cmd {
        GatewayCommands::Start { config } => serve(config.as_deref().or(top_level_config)).await,
        GatewayCommands::RegenerateToken { env_file } => {
            let key = aria_gateway::gateway::regenerate_api_key(env_file.as_deref())?;
            println!("New API key: {key}");
            Ok(())
        }
        GatewayCommands::ShowConfig { config } => show_config(config.as_deref().or(top_level_config)),
    }
}

fn show_config(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = aria_config::load(config_path)?;
    println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
