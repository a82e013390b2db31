//! Engine counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for engine outcomes.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Proposals executed exactly once.
    pub executed: AtomicU64,
    /// Proposals skipped as already executed/pending.
    pub skipped: AtomicU64,
    /// Proposals rejected by verification.
    pub verification_failed: AtomicU64,
    /// Handler dispatches that failed (retryable).
    pub execution_failed: AtomicU64,
    /// Nonce marks rolled back after a failed dispatch.
    pub rollbacks: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineMetricsSnapshot {
    pub executed: u64,
    pub skipped: u64,
    pub verification_failed: u64,
    pub execution_failed: u64,
    pub rollbacks: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verification_failed(&self) {
        self.verification_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_failed(&self) {
        self.execution_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            verification_failed: self.verification_failed.load(Ordering::Relaxed),
            execution_failed: self.execution_failed.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}
