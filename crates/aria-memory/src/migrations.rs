// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Declarative, versioned schema migrations for [`crate::sqlite_store::SqliteStore`].
//!
//! Each entry is applied in order inside one transaction and recorded in
//! `schema_migrations`. Production deployments configured with the `sqlite`
//! backend may not rely on implicit schema creation outside of this list.

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: include_str!("../migrations/0001_initial.sql"),
    },
];
