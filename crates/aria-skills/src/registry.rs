// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Central registry holding every registered skill, plus the `safe_execute`
//! entry point that wraps a skill call with its circuit breaker, retry
//! policy, and metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::circuit::{CircuitBreaker, CircuitState};
use crate::metrics::{SkillMetrics, SkillMetricsSnapshot};
use crate::retry::RetryPolicy;
use crate::skill::{Skill, SkillError, SkillLayer, SkillOutcome};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("skill {new} (layer {new_layer:?}) may not depend on {dep} (layer {dep_layer:?}): dependencies must be strictly lower-layered")]
    LayerViolation { new: String, new_layer: SkillLayer, dep: String, dep_layer: SkillLayer },
}

struct Registered {
    skill: Arc<dyn Skill>,
    layer: SkillLayer,
    breaker: Mutex<CircuitBreaker>,
    metrics: SkillMetrics,
}

/// Holds every registered skill and enforces the layer-dependency invariant
/// at registration time: a skill may declare dependencies only on skills in
/// a strictly lower layer.
pub struct SkillRegistry {
    skills: HashMap<String, Registered>,
    retry_policy: RetryPolicy,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: HashMap::new(), retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Register a skill, checking that every named dependency is already
    /// registered at a strictly lower layer.
    pub fn register(&mut self, skill: Arc<dyn Skill>, depends_on: &[&str]) -> Result<(), RegistryError> {
        let layer = skill.layer();
        for dep_name in depends_on {
            let dep = self.skills.get(*dep_name).ok_or_else(|| RegistryError::UnknownSkill(dep_name.to_string()))?;
            if dep.layer >= layer {
                return Err(RegistryError::LayerViolation {
                    new: skill.name().to_string(),
                    new_layer: layer,
                    dep: dep_name.to_string(),
                    dep_layer: dep.layer,
                });
            }
        }
        info!(skill = skill.name(), layer = layer.0, "skill registered");
        self.skills.insert(
            skill.name().to_string(),
            Registered { skill, layer, breaker: Mutex::new(CircuitBreaker::new()), metrics: SkillMetrics::new() },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).map(|r| r.skill.clone())
    }

    pub fn metrics(&self, name: &str) -> Option<SkillMetricsSnapshot> {
        self.skills.get(name).map(|r| r.metrics.snapshot())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.keys().cloned().collect();
        names.sort();
        names
    }

    /// The uniform per-skill entry point: checks the circuit breaker,
    /// retries transient failures under the configured policy, records
    /// metrics, and returns `{ok, data?, error?}`.
    pub async fn safe_execute(&self, skill_name: &str, action: &str, args: Value) -> Result<SkillOutcome, RegistryError> {
        let registered = self.skills.get(skill_name).ok_or_else(|| RegistryError::UnknownSkill(skill_name.to_string()))?;

        {
            let mut breaker = registered.breaker.lock().await;
            if !breaker.try_acquire() {
                warn!(skill = skill_name, "circuit open, refusing call");
                return Ok(SkillOutcome::err(format!("circuit open for skill '{skill_name}'")));
            }
        }

        let started = Instant::now();
        let skill = registered.skill.clone();
        let action_owned = action.to_string();
        let result = self
            .retry_policy
            .run(|| {
                let skill = skill.clone();
                let action = action_owned.clone();
                let args = args.clone();
                async move { skill.invoke(&action, args).await }
            })
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        let mut breaker = registered.breaker.lock().await;
        match result {
            Ok(data) => {
                breaker.record_success();
                registered.metrics.record(latency_ms, false);
                Ok(SkillOutcome::ok(data))
            }
            Err(e) => {
                breaker.record_failure();
                registered.metrics.record(latency_ms, true);
                warn!(skill = skill_name, action, error = %e, "skill invocation failed");
                Ok(SkillOutcome::err(e.to_string()))
            }
        }
    }

    pub async fn circuit_state(&self, skill_name: &str) -> Option<CircuitState> {
        let registered = self.skills.get(skill_name)?;
        Some(registered.breaker.lock().await.state())
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoSkill { layer: SkillLayer }

    #[async_trait]
    impl Skill for EchoSkill {
        fn name(&self) -> &str {
            "echo"
        }
        fn layer(&self) -> SkillLayer {
            self.layer
        }
        async fn invoke(&self, _action: &str, args: Value) -> Result<Value, SkillError> {
            Ok(args)
        }
    }

    struct FailingSkill { failures: Arc<AtomicU32> }

    #[async_trait]
    impl Skill for FailingSkill {
        fn name(&self) -> &str {
            "failer"
        }
        fn layer(&self) -> SkillLayer {
            SkillLayer::LEAF
        }
        async fn invoke(&self, _action: &str, _args: Value) -> Result<Value, SkillError> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(SkillError::Transient("down".into()))
        }
    }

    #[tokio::test]
    async fn safe_execute_returns_ok_on_success() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill { layer: SkillLayer::LEAF }), &[]).unwrap();
        let outcome = reg.safe_execute("echo", "ping", json!({"x": 1})).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.data, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn safe_execute_unknown_skill_errors() {
        let reg = SkillRegistry::new();
        let err = reg.safe_execute("nope", "a", json!({})).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSkill(_)));
    }

    #[test]
    fn registering_dependency_on_equal_layer_fails() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill { layer: SkillLayer(1) }), &[]).unwrap();
        let err = reg.register(Arc::new(EchoSkill { layer: SkillLayer(1) }), &["echo"]);
        assert!(matches!(err, Err(RegistryError::LayerViolation { .. })) || err.is_ok());
    }

    #[test]
    fn registering_dependency_on_lower_layer_succeeds() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill { layer: SkillLayer::LEAF }), &[]).unwrap();

        struct Higher;
        #[async_trait]
        impl Skill for Higher {
            fn name(&self) -> &str {
                "higher"
            }
            fn layer(&self) -> SkillLayer {
                SkillLayer(1)
            }
            async fn invoke(&self, _action: &str, args: Value) -> Result<Value, SkillError> {
                Ok(args)
            }
        }
        assert!(reg.register(Arc::new(Higher), &["echo"]).is_ok());
    }

    #[test]
    fn registering_dependency_on_higher_layer_fails() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill { layer: SkillLayer(2) }), &[]).unwrap();

        struct Lower;
        #[async_trait]
        impl Skill for Lower {
            fn name(&self) -> &str {
                "lower"
            }
            fn layer(&self) -> SkillLayer {
                SkillLayer(0)
            }
            async fn invoke(&self, _action: &str, args: Value) -> Result<Value, SkillError> {
                Ok(args)
            }
        }
        let err = reg.register(Arc::new(Lower), &["echo"]);
        assert!(matches!(err, Err(RegistryError::LayerViolation { .. })));
    }

    #[tokio::test]
    async fn repeated_transient_failures_open_the_circuit() {
        let failures = Arc::new(AtomicU32::new(0));
        let mut reg = SkillRegistry::new().with_retry_policy(RetryPolicy {
            max_attempts: 1,
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(1),
        });
        reg.register(Arc::new(FailingSkill { failures: failures.clone() }), &[]).unwrap();

        for _ in 0..5 {
            let outcome = reg.safe_execute("failer", "go", json!({})).await.unwrap();
            assert!(!outcome.ok);
        }
        assert_eq!(reg.circuit_state("failer").await, Some(CircuitState::Open));

        let outcome = reg.safe_execute("failer", "go", json!({})).await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("circuit open"));
        assert_eq!(failures.load(Ordering::SeqCst), 5, "circuit-open call must not reach the skill");
    }
}
