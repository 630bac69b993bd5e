// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process wiring for the cognitive core.
//!
//! Every other crate in the workspace exposes a piece of the core
//! (persistence, the LLM gateway, the agent pool, the orchestrator, the
//! scheduler) as a standalone, independently testable type. This crate is
//! the one place that constructs all of them from a [`aria_config::Config`]
//! and hands back a single [`CoreContext`] — the constructed context passed
//! by reference that the design notes call for in place of module-level
//! singletons.
//!
//! It also owns first-run bootstrap: generating the process API key and the
//! provider master key the first time the process starts with neither set,
//! mirroring how the rest of the workspace treats generated secrets as
//! something to create once, print once, and persist to an environment file.

mod context;
mod keys;
mod title;

pub use context::CoreContext;
pub use keys::{bootstrap_keys, default_env_path, BootstrapKeys, API_KEY_VAR, LLM_MASTER_KEY_VAR};
pub use title::GatewayTitleSummarizer;
