// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent Pool, delegation, and the Roundtable/Swarm orchestrator.

pub mod agent;
pub mod orchestrator;

pub use agent::{AgentPool, AgentPoolError, DelegationResult, DelegationStatus, GatewayModelRunner, ModelRunner};
pub use orchestrator::{
    policy::{DeclaredOrder, InitiativeOrder, TurnOrderPolicy},
    OrchestratorError, Participant, Roundtable, RoundtableResult, Swarm, SwarmResult, Turn, WorkerRecap,
};
