// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
pub mod circuit;
pub mod gateway;
mod http_compat;
pub mod rate_limit;
pub mod registry;
pub mod sanitize;
mod mock;
mod provider;
mod types;

pub use catalog::{InputModality, ModelCatalogEntry};
pub use gateway::{build_provider, GatewayError, ModelGateway};
pub use http_compat::HttpCompatProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::ModelProvider;
pub use registry::{get_driver, list_drivers, DriverMeta};
pub use types::*;
