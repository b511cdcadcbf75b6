//! Word filter telemetry
//!
//! Lock-free counters bumped on the hot path. Every bump is paired with a
//! structured `tracing` event on [`AUTOMOD_TARGET`] so the JSON log carries
//! the same information as the counters.

use crate::AUTOMOD_TARGET;
use crate::automod::error::{LockStoreError, WorkerError};
use crate::automod::lock::DedupeKey;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters for the automod pipeline
#[derive(Debug, Default)]
pub struct AutomodMetrics {
    messages_scanned: AtomicU64,
    moderator_skips: AtomicU64,
    filter_disabled: AtomicU64,
    settings_failures: AtomicU64,
    matches: AtomicU64,
    worker_timeouts: AtomicU64,
    worker_failures: AtomicU64,
    invariant_violations: AtomicU64,
    soft_failures: AtomicU64,
    hard_executed: AtomicU64,
    hard_failures: AtomicU64,
    lock_contended: AtomicU64,
    lock_store_failures: AtomicU64,
}

/// Point-in-time copy of [`AutomodMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_scanned: u64,
    pub moderator_skips: u64,
    pub filter_disabled: u64,
    pub settings_failures: u64,
    pub matches: u64,
    pub worker_timeouts: u64,
    pub worker_failures: u64,
    pub invariant_violations: u64,
    pub soft_failures: u64,
    pub hard_executed: u64,
    pub hard_failures: u64,
    pub lock_contended: u64,
    pub lock_store_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl AutomodMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            messages_scanned: load(&self.messages_scanned),
            moderator_skips: load(&self.moderator_skips),
            filter_disabled: load(&self.filter_disabled),
            settings_failures: load(&self.settings_failures),
            matches: load(&self.matches),
            worker_timeouts: load(&self.worker_timeouts),
            worker_failures: load(&self.worker_failures),
            invariant_violations: load(&self.invariant_violations),
            soft_failures: load(&self.soft_failures),
            hard_executed: load(&self.hard_executed),
            hard_failures: load(&self.hard_failures),
            lock_contended: load(&self.lock_contended),
            lock_store_failures: load(&self.lock_store_failures),
        }
    }

    pub fn record_scanned(&self) {
        bump(&self.messages_scanned);
    }

    pub fn record_moderator_skip(&self) {
        bump(&self.moderator_skips);
    }

    pub fn record_filter_disabled(&self) {
        bump(&self.filter_disabled);
    }

    pub fn record_settings_failure(&self, guild_id: u64, reason: &str) {
        bump(&self.settings_failures);
        warn!(
            target: AUTOMOD_TARGET,
            guild_id,
            error = %reason,
            event = "settings_unavailable",
            "Skipping word filter, settings unavailable"
        );
    }

    pub fn record_match(&self, guild_id: u64, word: &str) {
        bump(&self.matches);
        info!(
            target: AUTOMOD_TARGET,
            guild_id,
            word = %word,
            event = "filter_match",
            "Word filter matched"
        );
    }

    /// Worker failures are treated as no match downstream; the counters keep
    /// a timeout distinguishable from a real miss and from a broken worker.
    pub fn record_worker_error(&self, guild_id: u64, error: &WorkerError, timeout: Duration) {
        match error {
            WorkerError::Timeout(_) => {
                bump(&self.worker_timeouts);
                warn!(
                    target: AUTOMOD_TARGET,
                    guild_id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    event = "worker_timeout",
                    "Match worker timed out, treating as no match"
                );
            }
            WorkerError::Unavailable | WorkerError::InvalidPattern(_) => {
                bump(&self.worker_failures);
                error!(
                    target: AUTOMOD_TARGET,
                    guild_id,
                    error = %error,
                    event = "worker_failure",
                    "Match worker failed, treating as no match"
                );
            }
        }
    }

    pub fn record_invariant_violation(&self, guild_id: u64, canonical: &str) {
        bump(&self.invariant_violations);
        error!(
            target: AUTOMOD_TARGET,
            guild_id,
            canonical = %canonical,
            event = "unresolved_match",
            "Filter matched text that resolves to no word entry"
        );
    }

    pub fn record_soft_failure(&self, action: &'static str, error: &dyn std::fmt::Display) {
        bump(&self.soft_failures);
        warn!(
            target: AUTOMOD_TARGET,
            action,
            error = %error,
            event = "soft_action_failed",
            "Soft punishment failed"
        );
    }

    pub fn record_hard_executed(&self, kind: &dyn std::fmt::Display, log_id: &str) {
        bump(&self.hard_executed);
        info!(
            target: AUTOMOD_TARGET,
            kind = %kind,
            log_id = %log_id,
            event = "hard_action_executed",
            "Hard punishment executed"
        );
    }

    pub fn record_hard_failure(&self, kind: &dyn std::fmt::Display, error: &dyn std::fmt::Display) {
        bump(&self.hard_failures);
        error!(
            target: AUTOMOD_TARGET,
            kind = %kind,
            error = %error,
            event = "hard_action_failed",
            "Hard punishment failed, not retrying"
        );
    }

    pub fn record_lock_contended(&self, key: &DedupeKey) {
        bump(&self.lock_contended);
        debug!(
            target: AUTOMOD_TARGET,
            key = %key,
            event = "dedupe_lock_held",
            "Escalation already in progress, skipping"
        );
    }

    pub fn record_lock_store_failure(&self, key: &DedupeKey, error: &LockStoreError) {
        bump(&self.lock_store_failures);
        warn!(
            target: AUTOMOD_TARGET,
            key = %key,
            error = %error,
            event = "dedupe_store_unavailable",
            "Cannot prove escalation is unique, skipping"
        );
    }
}
