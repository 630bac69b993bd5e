// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Converts [`CoreError`] to the uniform HTTP error envelope and to a typed
//! GraphQL error, both carrying the request's correlation id.

use aria_core::{CoreError, CorrelationId};
use axum::{http::StatusCode, response::IntoResponse, Json};

/// Wraps a `CoreError` with the correlation id of the request that produced
/// it, so the axum error response and the GraphQL error path share one
/// conversion.
pub struct GatewayError {
    pub error: CoreError,
    pub correlation_id: CorrelationId,
}

impl GatewayError {
    pub fn new(error: CoreError, correlation_id: CorrelationId) -> Self {
        Self { error, correlation_id }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = self.error.envelope(self.correlation_id);
        (status, Json(envelope)).into_response()
    }
}

impl From<GatewayError> for async_graphql::Error {
    fn from(e: GatewayError) -> Self {
        async_graphql::Error::new(e.error.to_string())
            .extend_with(|_, ext| {
                ext.set("code", e.error.kind());
                ext.set("correlation_id", e.correlation_id.to_string());
            })
    }
}
