// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the cognitive core.
///
/// Deserialized from the merged YAML layers produced by [`crate::loader::load`].
/// Every field has a default so a deployment with zero config files still
/// gets a usable (development-mode) configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub agents: AgentPoolConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Disables fail-closed auth and verbose safety checks. Never set this
    /// in a production deployment — see [`GatewayConfig`].
    #[serde(default)]
    pub debug: bool,
}

/// The model catalog and tier routing policy. The catalog is the single
/// authoritative source for which models exist and how they're reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Tier preference order consulted during fallback selection.
    #[serde(default = "default_tier_order")]
    pub tier_order: Vec<Tier>,
    /// Optional primary override; short-circuits tier selection unless its
    /// circuit is open.
    #[serde(default)]
    pub primary: Option<String>,
    /// Configured model endpoints, keyed by model id.
    #[serde(default)]
    pub catalog: HashMap<String, ModelEntryConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let mut catalog = HashMap::new();
        catalog.insert(
            "mock-local".to_string(),
            ModelEntryConfig {
                provider: "mock".to_string(),
                tier: Tier::Local,
                display_name: "Mock Local".to_string(),
                max_rpm: None,
                max_tpd: None,
                cooldown_seconds: 0,
                context_window: 32_768,
                max_output_tokens: 4_096,
                supports_tools: true,
                alias: Some("mock".to_string()),
                base_url: None,
                api_key_env: None,
            },
        );
        Self {
            tier_order: default_tier_order(),
            primary: None,
            catalog,
        }
    }
}

fn default_tier_order() -> Vec<Tier> {
    vec![Tier::Local, Tier::Free, Tier::Paid]
}

/// Model cost/locality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Free,
    Paid,
}

/// A single configured model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntryConfig {
    pub provider: String,
    pub tier: Tier,
    pub display_name: String,
    /// `None` = unbounded requests per minute.
    #[serde(default)]
    pub max_rpm: Option<u32>,
    /// `None` = unbounded tokens per day.
    #[serde(default)]
    pub max_tpd: Option<u64>,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_true")]
    pub supports_tools: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_context_window() -> u32 {
    32_768
}
fn default_max_output_tokens() -> u32 {
    4_096
}
fn default_true() -> bool {
    true
}

/// Agent pool sizing and delegation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPoolConfig {
    /// Maximum number of agents concurrently in the `busy` state.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    #[serde(default = "default_delegate_timeout_secs")]
    pub default_delegate_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AgentPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            default_delegate_timeout_secs: default_delegate_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_max_concurrent_agents() -> usize {
    16
}
fn default_delegate_timeout_secs() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Roundtable / swarm defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_agent_timeout_secs")]
    pub per_agent_timeout_secs: u64,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default)]
    pub synthesis_mode: SynthesisMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            per_agent_timeout_secs: default_agent_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            synthesis_mode: SynthesisMode::default(),
        }
    }
}

fn default_rounds() -> u32 {
    1
}
fn default_agent_timeout_secs() -> u64 {
    120
}
fn default_session_timeout_secs() -> u64 {
    7_200
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    #[default]
    Analysis,
    Narrative,
}

/// Declarative cron job source, and the fixed background-task cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub jobs: Vec<CronJobConfig>,
    #[serde(default = "default_ghost_prune_interval_secs")]
    pub ghost_prune_interval_secs: u64,
    #[serde(default = "default_archive_scan_interval_secs")]
    pub archive_scan_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            ghost_prune_interval_secs: default_ghost_prune_interval_secs(),
            archive_scan_interval_secs: default_archive_scan_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

fn default_ghost_prune_interval_secs() -> u64 {
    600
}
fn default_archive_scan_interval_secs() -> u64 {
    21_600
}
fn default_heartbeat_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobConfig {
    pub name: String,
    /// Standard 5-field cron expression.
    pub schedule: String,
    pub skill: String,
    pub action: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Ghost TTL and archive pruning defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ghost_ttl_minutes")]
    pub ghost_ttl_minutes: i64,
    #[serde(default = "default_prune_after_days")]
    pub prune_after_days: i64,
    #[serde(default = "default_slow_title_timeout_secs")]
    pub slow_title_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ghost_ttl_minutes: default_ghost_ttl_minutes(),
            prune_after_days: default_prune_after_days(),
            slow_title_timeout_secs: default_slow_title_timeout_secs(),
        }
    }
}

fn default_ghost_ttl_minutes() -> i64 {
    15
}
fn default_prune_after_days() -> i64 {
    90
}
fn default_slow_title_timeout_secs() -> u64 {
    5
}

/// HTTP/WS/GraphQL bind and auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Environment variable holding the process-wide API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_rate_limit_per_min")]
    pub rate_limit_failed_auth_per_min: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_key_env: default_api_key_env(),
            production: false,
            rate_limit_failed_auth_per_min: default_rate_limit_per_min(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_api_key_env() -> String {
    "ARIA_API_KEY".to_string()
}
fn default_rate_limit_per_min() -> u32 {
    10
}

/// Which `Store` implementation the persistence gateway constructs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,
    /// Path to the SQLite database file when `backend = sqlite`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "aria.sqlite3".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Sqlite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_mock_model_and_local_tier_first() {
        let cfg = Config::default();
        assert_eq!(cfg.models.tier_order[0], Tier::Local);
        assert!(cfg.models.catalog.contains_key("mock-local"));
    }

    #[test]
    fn default_ghost_ttl_is_fifteen_minutes() {
        assert_eq!(SessionConfig::default().ghost_ttl_minutes, 15);
    }

    #[test]
    fn default_gateway_is_not_production() {
        assert!(!GatewayConfig::default().production);
    }

    #[test]
    fn yaml_round_trip_preserves_custom_tier_order() {
        let yaml = "models:\n  tier_order: [paid, free, local]\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.models.tier_order,
            vec![Tier::Paid, Tier::Free, Tier::Local]
        );
    }

    #[test]
    fn partial_yaml_fills_remaining_fields_with_defaults() {
        let yaml = "debug: true\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.sessions.ghost_ttl_minutes, 15);
    }

    #[test]
    fn cron_job_args_default_to_null() {
        let yaml = "scheduler:\n  jobs:\n    - name: nightly\n      schedule: \"0 3 * * *\"\n      skill: maintenance\n      action: sweep\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduler.jobs.len(), 1);
        assert!(cfg.scheduler.jobs[0].args.is_null());
    }
}
