// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The error taxonomy surfaced at every transport boundary. Every fallible
//! path in the cognitive core returns (or converts into) a [`CoreError`];
//! nothing is silently swallowed except retried-and-recovered transient
//! failures inside the skill framework.

use thiserror::Error;

use crate::correlation::CorrelationId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("circuit open, retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },
    #[error("timeout")]
    Timeout,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::NotFound => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden => 403,
            CoreError::RateLimited { .. } => 429,
            CoreError::CircuitOpen { .. } => 503,
            CoreError::Timeout => 504,
            CoreError::Transient(_) => 500,
            CoreError::Validation { .. } => 422,
            CoreError::Fatal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::Unauthorized => "unauthorized",
            CoreError::Forbidden => "forbidden",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::CircuitOpen { .. } => "circuit_open",
            CoreError::Timeout => "timeout",
            CoreError::Transient(_) => "transient",
            CoreError::Validation { .. } => "validation",
            CoreError::Fatal(_) => "fatal",
        }
    }

    /// The uniform transport-boundary error envelope: `{error, detail,
    /// correlation_id}`.
    pub fn envelope(&self, correlation_id: CorrelationId) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.kind().to_string(),
            detail: self.to_string(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

impl From<aria_memory::StoreError> for CoreError {
    fn from(e: aria_memory::StoreError) -> Self {
        match e {
            aria_memory::StoreError::NotFound => CoreError::NotFound,
            aria_memory::StoreError::Conflict(m) => CoreError::Conflict(m),
            aria_memory::StoreError::Backend(e) => CoreError::Transient(e.to_string()),
        }
    }
}

/// Preserves the LLM Gateway's circuit/rate-limit/timeout distinctions
/// instead of collapsing every model-call failure to a generic transient
/// error, so `/chat` and delegation surface 429/503/504 as called for.
impl From<aria_model::GatewayError> for CoreError {
    fn from(e: aria_model::GatewayError) -> Self {
        use aria_model::GatewayError;
        match &e {
            GatewayError::RateLimited(_) => CoreError::RateLimited { retry_after_secs: aria_model::rate_limit::MINUTE.as_secs() },
            GatewayError::CircuitOpen(_) => CoreError::CircuitOpen { retry_after_secs: aria_model::circuit::OPEN_COOLDOWN.as_secs() },
            GatewayError::Timeout(_) => CoreError::Timeout,
            GatewayError::UnknownModel(m) => CoreError::Validation { field: "model".into(), message: format!("unknown model {m:?}") },
            GatewayError::NoModelAvailable | GatewayError::Provider(_) => CoreError::Transient(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kind() {
        assert_eq!(CoreError::NotFound.status_code(), 404);
        assert_eq!(CoreError::Conflict("x".into()).status_code(), 409);
        assert_eq!(CoreError::RateLimited { retry_after_secs: 1 }.status_code(), 429);
        assert_eq!(CoreError::CircuitOpen { retry_after_secs: 1 }.status_code(), 503);
        assert_eq!(CoreError::Timeout.status_code(), 504);
        assert_eq!(CoreError::Validation { field: "x".into(), message: "y".into() }.status_code(), 422);
    }

    #[test]
    fn envelope_carries_correlation_id() {
        let cid = CorrelationId::new();
        let env = CoreError::NotFound.envelope(cid);
        assert_eq!(env.correlation_id, cid.to_string());
        assert_eq!(env.error, "not_found");
    }
}
