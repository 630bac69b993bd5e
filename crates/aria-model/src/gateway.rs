// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The LLM Gateway: tier-ordered model selection, per-model rate limiting,
//! circuit breaking, and call-level timeouts, sitting in front of the raw
//! [`crate::ModelProvider`] drivers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::warn;

use aria_config::{Config, ModelEntryConfig, Tier};

use crate::circuit::CircuitBreaker;
use crate::provider::ResponseStream;
use crate::rate_limit::RateLimiter;
use crate::{CompletionRequest, ModelProvider, ResponseEvent};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no model available: every configured model is rate-limited or circuit-open")]
    NoModelAvailable,
    #[error("model {0:?} is not present in the catalog")]
    UnknownModel(String),
    #[error("model {0:?} is rate-limited (rpm or tpd budget exhausted)")]
    RateLimited(String),
    #[error("model {0:?} circuit is open")]
    CircuitOpen(String),
    #[error("call to model {0:?} timed out")]
    Timeout(String),
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

#[derive(Default)]
struct ModelState {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

/// Builds a boxed [`ModelProvider`] from a single catalog entry.
pub fn build_provider(entry: &ModelEntryConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match entry.provider.as_str() {
        "mock" => Ok(Box::new(crate::mock::MockProvider)),
        "openai-compat" => {
            let base_url = entry
                .base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("openai-compat entry requires base_url"))?;
            let api_key = entry
                .api_key_env
                .as_ref()
                .and_then(|env| std::env::var(env).ok());
            Ok(Box::new(crate::http_compat::HttpCompatProvider::new(
                base_url,
                api_key,
                entry.alias.clone().unwrap_or_default(),
                entry.max_output_tokens,
                None,
                DEFAULT_CALL_TIMEOUT,
            )))
        }
        other => anyhow::bail!("unknown model provider: {other:?}"),
    }
}

/// Coordinates model selection, quota enforcement, and breaker state across
/// every configured model. Constructed once and shared behind an [`Arc`] for
/// the process lifetime.
#[derive(Default)]
pub struct ModelGateway {
    states: Mutex<HashMap<String, ModelState>>,
}

impl ModelGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_state<R>(&self, model_id: &str, entry: &ModelEntryConfig, f: impl FnOnce(&mut ModelState) -> R) -> R {
        let mut guard = self.states.lock().unwrap();
        let state = guard.entry(model_id.to_string()).or_insert_with(|| ModelState {
            breaker: CircuitBreaker::new(),
            limiter: RateLimiter::new(entry.max_rpm, entry.max_tpd),
        });
        f(state)
    }

    /// `true` if `model_id` may currently be selected (circuit not open and
    /// daily token budget not yet exhausted), without consuming any quota.
    fn is_candidate(&self, model_id: &str, entry: &ModelEntryConfig) -> bool {
        self.with_state(model_id, entry, |state| {
            !matches!(state.breaker.state(), crate::circuit::CircuitState::Open)
                && state.limiter.tokens_used_today(Instant::now()) < entry.max_tpd.unwrap_or(u64::MAX)
        })
    }

    /// Select the model to use for the next call: `models.primary` short-circuits
    /// selection unless its circuit is open, otherwise the first tier (in
    /// `models.tier_order`) with an eligible candidate wins, ties broken by
    /// catalog key for determinism.
    pub fn select(&self, config: &Config) -> Option<String> {
        if let Some(primary) = &config.models.primary {
            if let Some(entry) = config.models.catalog.get(primary) {
                if self.is_candidate(primary, entry) {
                    return Some(primary.clone());
                }
            }
        }
        for tier in &config.models.tier_order {
            if let Some(id) = self.pick_in_tier(config, *tier) {
                return Some(id);
            }
        }
        None
    }

    fn pick_in_tier(&self, config: &Config, tier: Tier) -> Option<String> {
        let mut ids: Vec<&String> = config
            .models
            .catalog
            .iter()
            .filter(|(_, e)| e.tier == tier)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        for id in ids {
            let entry = &config.models.catalog[id];
            if self.is_candidate(id, entry) {
                return Some(id.clone());
            }
        }
        None
    }

    /// Run one completion call against `model_id`, enforcing quota, circuit
    /// state, and the call/idle timeouts. Requires the gateway to be held in
    /// an `Arc` so the returned stream can outlive this call.
    pub async fn complete(
        self: &Arc<Self>,
        config: &Config,
        model_id: &str,
        req: CompletionRequest,
    ) -> Result<ResponseStream, GatewayError> {
        let entry = config
            .models
            .catalog
            .get(model_id)
            .ok_or_else(|| GatewayError::UnknownModel(model_id.to_string()))?
            .clone();

        let admitted = self.with_state(model_id, &entry, |state| {
            if !state.breaker.try_acquire() {
                return Err(GatewayError::CircuitOpen(model_id.to_string()));
            }
            if !state.limiter.try_acquire(Instant::now()) {
                // The half-open probe slot was consumed by try_acquire above but
                // the call never went out; give it back.
                state.breaker.record_success();
                return Err(GatewayError::RateLimited(model_id.to_string()));
            }
            Ok(())
        });
        admitted?;

        let provider = build_provider(&entry).map_err(GatewayError::Provider)?;
        let call = provider.complete(req);
        let stream = match tokio::time::timeout(DEFAULT_CALL_TIMEOUT, call).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                self.record_failure(model_id, &entry);
                return Err(GatewayError::Provider(e));
            }
            Err(_) => {
                self.record_failure(model_id, &entry);
                return Err(GatewayError::Timeout(model_id.to_string()));
            }
        };

        Ok(guarded_stream(stream, Arc::clone(self), model_id.to_string(), entry))
    }

    fn record_failure(&self, model_id: &str, entry: &ModelEntryConfig) {
        self.with_state(model_id, entry, |state| state.breaker.record_failure());
    }

    fn record_success(&self, model_id: &str, entry: &ModelEntryConfig, tokens: u64) {
        self.with_state(model_id, entry, |state| {
            state.breaker.record_success();
            if tokens > 0 {
                state.limiter.record_tokens(Instant::now(), tokens);
            }
        });
    }

    /// Current breaker state for `model_id`, for admin/status surfaces.
    /// `None` if the model has never been selected (no state entry yet).
    pub fn circuit_state(&self, model_id: &str) -> Option<crate::circuit::CircuitState> {
        self.states.lock().unwrap().get(model_id).map(|s| s.breaker.state())
    }
}

/// Wrap a provider's raw stream so that its terminal outcome (success, error,
/// or idle timeout) updates the owning gateway's breaker/limiter state, and
/// so a stalled provider can't hang a caller forever.
fn guarded_stream(
    mut inner: ResponseStream,
    gateway: Arc<ModelGateway>,
    model_id: String,
    entry: ModelEntryConfig,
) -> ResponseStream {
    Box::pin(async_stream::stream! {
        let mut total_tokens: u64 = 0;
        loop {
            match tokio::time::timeout(STREAM_IDLE_TIMEOUT, inner.next()).await {
                Ok(Some(Ok(event))) => {
                    if let ResponseEvent::Usage { input_tokens, output_tokens, .. } = &event {
                        total_tokens += (*input_tokens + *output_tokens) as u64;
                    }
                    let done = matches!(event, ResponseEvent::Done);
                    yield Ok(event);
                    if done {
                        gateway.record_success(&model_id, &entry, total_tokens);
                        return;
                    }
                }
                Ok(Some(Err(e))) => {
                    gateway.record_failure(&model_id, &entry);
                    yield Err(e);
                    return;
                }
                Ok(None) => {
                    gateway.record_success(&model_id, &entry, total_tokens);
                    return;
                }
                Err(_) => {
                    gateway.record_failure(&model_id, &entry);
                    warn!(model = %model_id, "stream idle timeout");
                    yield Err(anyhow::anyhow!("stream idle timeout after {:?}", STREAM_IDLE_TIMEOUT));
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn mock_config() -> Config {
        let mut cfg = Config::default();
        cfg.models.tier_order = vec![Tier::Local, Tier::Free, Tier::Paid];
        cfg
    }

    #[test]
    fn select_returns_mock_local_by_default() {
        let gw = ModelGateway::new();
        let cfg = mock_config();
        assert_eq!(gw.select(&cfg), Some("mock-local".to_string()));
    }

    #[test]
    fn select_prefers_primary_when_set() {
        let gw = ModelGateway::new();
        let mut cfg = mock_config();
        cfg.models.catalog.insert(
            "backup".into(),
            ModelEntryConfig {
                provider: "mock".into(),
                tier: Tier::Paid,
                display_name: "Backup".into(),
                max_rpm: None,
                max_tpd: None,
                cooldown_seconds: 0,
                context_window: 4096,
                max_output_tokens: 1024,
                supports_tools: true,
                alias: None,
                base_url: None,
                api_key_env: None,
            },
        );
        cfg.models.primary = Some("backup".into());
        assert_eq!(gw.select(&cfg), Some("backup".to_string()));
    }

    #[tokio::test]
    async fn complete_runs_mock_and_records_success() {
        let gw = ModelGateway::new();
        let cfg = mock_config();
        let req = CompletionRequest {
            messages: vec![crate::Message::user("hi")],
            ..Default::default()
        };
        let mut stream = gw.complete(&cfg, "mock-local", req).await.unwrap();
        let mut saw_done = false;
        while let Some(ev) = stream.next().await {
            if matches!(ev.unwrap(), ResponseEvent::Done) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }

    #[tokio::test]
    async fn complete_unknown_model_errors() {
        let gw = ModelGateway::new();
        let cfg = mock_config();
        let req = CompletionRequest::default();
        let result = gw.complete(&cfg, "no-such-model", req).await;
        assert!(matches!(result, Err(GatewayError::UnknownModel(_))));
    }

    #[tokio::test]
    async fn rpm_exhaustion_returns_rate_limited() {
        let gw = ModelGateway::new();
        let mut cfg = mock_config();
        cfg.models.catalog.get_mut("mock-local").unwrap().max_rpm = Some(1);
        let req = || CompletionRequest {
            messages: vec![crate::Message::user("hi")],
            ..Default::default()
        };
        let mut first = gw.complete(&cfg, "mock-local", req()).await.unwrap();
        while first.next().await.is_some() {}
        let second = gw.complete(&cfg, "mock-local", req()).await;
        assert!(matches!(second, Err(GatewayError::RateLimited(_))));
    }

    #[test]
    fn five_failures_open_the_circuit() {
        let gw = ModelGateway::new();
        let cfg = mock_config();
        let entry = cfg.models.catalog.get("mock-local").unwrap().clone();
        for _ in 0..5 {
            gw.record_failure("mock-local", &entry);
        }
        assert!(!gw.is_candidate("mock-local", &entry));
    }
}
