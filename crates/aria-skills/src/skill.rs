// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The uniform contract every external-capability call goes through:
//! database writes, embeddings, network providers, filesystem operations,
//! and the LLM Gateway itself (the gateway is registered as a skill like
//! any other).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Leaves-first dependency ordering. A skill may declare a dependency on
/// another skill only if that skill's layer is strictly lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkillLayer(pub u8);

impl SkillLayer {
    pub const LEAF: SkillLayer = SkillLayer(0);
}

#[derive(Debug, Error)]
pub enum SkillError {
    /// Worth retrying: network blips, provider 5xx, lock contention.
    #[error("transient: {0}")]
    Transient(String),
    /// Not worth retrying: bad arguments, auth failure, not found.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SkillError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SkillError::Transient(_))
    }
}

/// A single tool invocation requested by a skill caller.
#[derive(Debug, Clone)]
pub struct SkillCall {
    pub action: String,
    pub args: Value,
}

/// Uniform outcome of `safe_execute`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkillOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillOutcome {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

/// A single external capability. Implementations never call another skill
/// directly — every cross-skill dependency goes through the persistence
/// or network gateway that both sides already depend on.
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;
    fn layer(&self) -> SkillLayer;
    async fn invoke(&self, action: &str, args: Value) -> Result<Value, SkillError>;
}
