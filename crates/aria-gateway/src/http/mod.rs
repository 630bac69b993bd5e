// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Assembles the full `axum` router: REST under `/`, WebSocket bridges under
//! `/ws`, and GraphQL under `/graphql`, wrapped in the middleware stack
//! (innermost to outermost: prompt-injection scan, CSRF guard, security
//! headers, API-key auth). Layers run outermost-first, so auth rejects
//! unauthenticated traffic before it ever reaches the scanner.

pub mod auth;
pub mod chat;
pub mod graphql;
pub mod routes;
pub mod scan;
pub mod security;
pub mod ws;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::GraphQL;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{middleware, Router};

use crate::AppState;

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

pub fn build_router(state: AppState) -> Router {
    let schema = graphql::build_schema(state.clone());

    let ws_routes = Router::new()
        .route("/ws/chat/:session_id", get(ws::ws_chat_handler))
        .route("/ws/roundtable", get(ws::ws_roundtable_handler));

    let graphql_routes = Router::new()
        .route("/graphql", get(graphiql).post_service(GraphQL::new(schema)));

    routes::router()
        .merge(ws_routes)
        .merge(graphql_routes)
        .layer(middleware::from_fn(scan::scan_body))
        .layer(middleware::from_fn(security::csrf_guard))
        .layer(middleware::from_fn(security::security_headers))
        .layer(middleware::from_fn_with_state(state.auth.clone(), auth::api_key_mw))
        .with_state(state)
}
