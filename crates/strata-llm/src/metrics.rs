//! Shared per-provider call metrics and health
//!
//! One instance per configured provider, created at initialization and
//! mutated by every call (one increment per attempt, including failed
//! retries). Reset only on explicit operator action; never destroyed
//! while the process runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::GatewayError;
use crate::types::Usage;

/// Concurrently-mutable metrics for one provider
#[derive(Debug)]
pub struct ProviderMetrics {
    provider: String,
    successes: AtomicU64,
    failures: AtomicU64,
    latency_ms_total: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    healthy: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl ProviderMetrics {
    /// Create zeroed metrics for a provider
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_ms_total: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            last_error: Mutex::new(None),
        }
    }

    /// Record one successful vendor attempt
    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.latency_ms_total
            .fetch_add(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX), Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
    }

    /// Record one failed vendor attempt
    ///
    /// Auth failures mark the provider unhealthy until a later success.
    pub fn record_failure(&self, error: &GatewayError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if matches!(error, GatewayError::Auth(_)) {
            self.healthy.store(false, Ordering::Relaxed);
        }
        let mut last_error = self.last_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *last_error = Some(error.to_string());
    }

    /// Record token usage for a completed or in-flight call
    pub fn record_usage(&self, usage: &Usage) {
        self.prompt_tokens.fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
    }

    /// Whether the provider is currently considered healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot for operator inspection
    pub fn snapshot(&self) -> MetricsSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let latency_ms_total = self.latency_ms_total.load(Ordering::Relaxed);

        MetricsSnapshot {
            provider: self.provider.clone(),
            requests: successes + failures,
            successes,
            failures,
            latency_ms_total,
            average_latency_ms: if successes == 0 { 0 } else { latency_ms_total / successes },
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            healthy: self.healthy.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
        }
    }

    /// Zero all counters and clear health state (operator action)
    pub fn reset(&self) {
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.latency_ms_total.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        let mut last_error = self.last_error.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *last_error = None;
    }
}

/// Point-in-time view of one provider's metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Provider name ("all" for aggregates)
    pub provider: String,
    /// Total vendor attempts
    pub requests: u64,
    /// Successful attempts
    pub successes: u64,
    /// Failed attempts
    pub failures: u64,
    /// Cumulative successful-attempt latency in milliseconds
    pub latency_ms_total: u64,
    /// Rolling average latency per successful attempt
    pub average_latency_ms: u64,
    /// Cumulative prompt tokens
    pub prompt_tokens: u64,
    /// Cumulative completion tokens
    pub completion_tokens: u64,
    /// Whether the provider is currently healthy
    pub healthy: bool,
    /// Most recent error message, if any
    pub last_error: Option<String>,
}

impl MetricsSnapshot {
    /// Merge per-provider snapshots into one aggregate view
    pub fn merge(snapshots: &[Self]) -> Self {
        let mut merged = Self {
            provider: "all".to_owned(),
            requests: 0,
            successes: 0,
            failures: 0,
            latency_ms_total: 0,
            average_latency_ms: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            healthy: true,
            last_error: None,
        };

        for snapshot in snapshots {
            merged.requests += snapshot.requests;
            merged.successes += snapshot.successes;
            merged.failures += snapshot.failures;
            merged.latency_ms_total += snapshot.latency_ms_total;
            merged.prompt_tokens += snapshot.prompt_tokens;
            merged.completion_tokens += snapshot.completion_tokens;
            merged.healthy &= snapshot.healthy;
            if merged.last_error.is_none() {
                merged.last_error.clone_from(&snapshot.last_error);
            }
        }

        if merged.successes > 0 {
            merged.average_latency_ms = merged.latency_ms_total / merged.successes;
        }

        merged
    }
}
