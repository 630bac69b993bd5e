// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistence gateway: a typed storage contract shared by every other
//! component, with an in-memory and an optional SQLite-backed implementation.
//!
//! No component may read another component's partition except through this
//! crate's [`Store`] trait — that is the enforcement point for the schema
//! partition invariant in the data model (sessions/messages/models/cron vs.
//! memories/activities/thoughts, the latter out of scope for the core).

pub mod entities;
pub mod memory_store;
#[cfg(feature = "sqlite")]
mod migrations;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod store;

pub use entities::*;
pub use memory_store::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;
pub use store::{Result, SessionFilter, SessionOrder, Store, StoreError};

use std::sync::Arc;

use aria_config::{Config, PersistenceBackend};

/// Construct the configured `Store` implementation from `Config`.
pub fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.persistence.backend {
        PersistenceBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        PersistenceBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.persistence.sqlite_path)?)),
        #[cfg(not(feature = "sqlite"))]
        PersistenceBackend::Sqlite => anyhow::bail!("sqlite backend requested but the `sqlite` feature is disabled"),
    }
}
