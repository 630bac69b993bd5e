// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Gateway startup — builds a [`aria_bootstrap::CoreContext`] from config,
//! wires the `AppState`, and serves HTTP/WS/GraphQL until shutdown.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order, then blocks on the HTTP server:
//!
//! 1. Build the [`aria_bootstrap::CoreContext`] (persistence, LLM gateway,
//!    agent pool, scheduler — in dependency order).
//! 2. Resolve the process-wide API key from `config.gateway.api_key_env`;
//!    fail closed if `production` is set and no key is present.
//! 3. Assemble the `axum` router (REST, WebSocket, GraphQL) behind the
//!    auth/CSRF/security-header/scan middleware stack.
//! 4. Spawn the [`aria_scheduler::Scheduler`]'s background loop.
//! 5. Bind and serve until Ctrl+C or SIGTERM, then signal the scheduler to
//!    stop and wait for the listener to drain.

use std::sync::Arc;

use aria_config::Config;
use tokio::sync::watch;
use tracing::info;

use crate::http::auth::AuthState;
use crate::AppState;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let production = config.gateway.production;
    let api_key = std::env::var(&config.gateway.api_key_env).ok();
    if production && api_key.is_none() {
        anyhow::bail!(
            "gateway.production is set but {} is not set; refusing to start unauthenticated",
            config.gateway.api_key_env
        );
    }
    if api_key.is_none() {
        info!(
            env = %config.gateway.api_key_env,
            "no API key configured; running unauthenticated (debug mode only)"
        );
    }
    let auth = AuthState::new(api_key, config.debug, config.gateway.rate_limit_failed_auth_per_min);

    let ctx = aria_bootstrap::CoreContext::build(config.clone())?;
    let state = AppState::from_context(&ctx, auth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ctx.scheduler.clone();
    tokio::spawn(scheduler.run(shutdown_rx));

    let router = crate::http::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.gateway.bind_addr).await?;
    info!(bind = %config.gateway.bind_addr, production, "starting gateway");

    axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

/// Regenerates the API key written to the bootstrap environment file,
/// printing the new raw key once. Thin wrapper around
/// [`aria_bootstrap::bootstrap_keys`] kept here since the CLI's `gateway`
/// subcommand is this crate's natural home for gateway secret management.
pub fn regenerate_api_key(env_path: Option<&std::path::Path>) -> anyhow::Result<Arc<str>> {
    let path = env_path.map(std::path::Path::to_path_buf).unwrap_or_else(aria_bootstrap::default_env_path);
    std::fs::remove_file(&path).ok();
    let keys = aria_bootstrap::bootstrap_keys(Some(&path))?;
    Ok(Arc::from(keys.api_key.as_str()))
}
