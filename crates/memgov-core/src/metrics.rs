//! Global atomic counters for memgov observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. after a replay or a CLI run).
//!
//! These are process-wide and observational only. The contract counters
//! asserted by tests (double decisions, illegal transitions) live on each
//! pipeline instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocations, no locking.
pub struct Metrics {
    proposals_created: AtomicU64,
    proposals_throttled: AtomicU64,
    decisions_applied: AtomicU64,
    illegal_transitions: AtomicU64,
    replays_executed: AtomicU64,
    redactions_performed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            proposals_created: AtomicU64::new(0),
            proposals_throttled: AtomicU64::new(0),
            decisions_applied: AtomicU64::new(0),
            illegal_transitions: AtomicU64::new(0),
            replays_executed: AtomicU64::new(0),
            redactions_performed: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_proposals_created(&self) {
        Self::bump(&self.proposals_created, "proposals_created");
    }

    pub fn inc_proposals_throttled(&self) {
        Self::bump(&self.proposals_throttled, "proposals_throttled");
    }

    pub fn inc_decisions_applied(&self) {
        Self::bump(&self.decisions_applied, "decisions_applied");
    }

    pub fn inc_illegal_transitions(&self) {
        Self::bump(&self.illegal_transitions, "illegal_transitions");
    }

    pub fn inc_replays(&self) {
        Self::bump(&self.replays_executed, "replays_executed");
    }

    pub fn inc_redactions(&self) {
        Self::bump(&self.redactions_performed, "redactions_performed");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            proposals_created = self.proposals_created(),
            proposals_throttled = self.proposals_throttled(),
            decisions_applied = self.decisions_applied(),
            illegal_transitions = self.illegal_transitions(),
            replays_executed = self.replays_executed(),
            redactions_performed = self.redactions_performed(),
        );
    }

    pub fn proposals_created(&self) -> u64 {
        self.proposals_created.load(Ordering::Relaxed)
    }

    pub fn proposals_throttled(&self) -> u64 {
        self.proposals_throttled.load(Ordering::Relaxed)
    }

    pub fn decisions_applied(&self) -> u64 {
        self.decisions_applied.load(Ordering::Relaxed)
    }

    pub fn illegal_transitions(&self) -> u64 {
        self.illegal_transitions.load(Ordering::Relaxed)
    }

    pub fn replays_executed(&self) -> u64 {
        self.replays_executed.load(Ordering::Relaxed)
    }

    pub fn redactions_performed(&self) -> u64 {
        self.redactions_performed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.proposals_created,
            &self.proposals_throttled,
            &self.decisions_applied,
            &self.illegal_transitions,
            &self.replays_executed,
            &self.redactions_performed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
