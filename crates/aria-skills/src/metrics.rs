// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Request counters, failure counters, and a latency accumulator shared by
//! every skill's `safe_execute` call and by the LLM Gateway, so both surface
//! through the same observability shape.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SkillMetrics {
    invocations: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SkillMetricsSnapshot {
    pub invocations: u64,
    pub failures: u64,
    pub avg_latency_ms: u64,
}

impl SkillMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency_ms: u64, failed: bool) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SkillMetricsSnapshot {
        let invocations = self.invocations.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        let avg_latency_ms = if invocations == 0 { 0 } else { total_latency_ms / invocations };
        SkillMetricsSnapshot { invocations, failures, avg_latency_ms }
    }
}
