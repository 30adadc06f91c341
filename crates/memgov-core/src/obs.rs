//! Structured observability hooks for governance lifecycle events.
//!
//! - `PipelineSpan` RAII guard scoping log lines to one pipeline instance
//! - `emit_*` functions for the lifecycle events operators care about
//!
//! Filtering follows `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{error, info, warn};

/// RAII guard that enters a pipeline-scoped span for one operation.
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(pipeline_id: &str, operation: &'static str) -> Self {
        let span = tracing::info_span!(
            "memgov.pipeline",
            pipeline_id = %pipeline_id,
            op = operation
        );
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_proposal_created(
    proposal_id: &str,
    memory_type: &str,
    subject_key: &str,
    created_seq: u64,
) {
    info!(
        event = "proposal.created",
        proposal_id = %proposal_id,
        memory_type = %memory_type,
        subject_key = %subject_key,
        created_seq = created_seq,
    );
}

pub fn emit_proposal_classified(proposal_id: &str, tier: &str, reason_code: &str) {
    info!(
        event = "proposal.classified",
        proposal_id = %proposal_id,
        tier = %tier,
        reason_code = %reason_code,
    );
}

pub fn emit_conflict_detected(
    conflict_id: &str,
    conflict_type: &str,
    existing: &str,
    incoming: &str,
) {
    info!(
        event = "conflict.detected",
        conflict_id = %conflict_id,
        conflict_type = %conflict_type,
        existing = %existing,
        incoming = %incoming,
    );
}

pub fn emit_proposal_queued(proposal_id: &str, state: &str, auto_approved: bool) {
    info!(
        event = "proposal.queued",
        proposal_id = %proposal_id,
        state = %state,
        auto_approved = auto_approved,
    );
}

pub fn emit_proposal_throttled(proposal_id: &str, reason: &str, pending: usize) {
    warn!(
        event = "proposal.throttled",
        proposal_id = %proposal_id,
        reason = %reason,
        pending = pending,
    );
}

pub fn emit_decision_applied(proposal_id: &str, action: &str, prior_state: &str, state: &str) {
    info!(
        event = "proposal.decision",
        proposal_id = %proposal_id,
        action = %action,
        prior_state = %prior_state,
        state = %state,
    );
}

pub fn emit_illegal_transition(proposal_id: &str, action: &str, reason: &str) {
    warn!(
        event = "proposal.illegal_transition",
        proposal_id = %proposal_id,
        action = %action,
        reason = %reason,
    );
}

pub fn emit_replay_finished(
    proposals: usize,
    decisions: usize,
    missing_refs: usize,
    ledger_state_hash: &str,
) {
    info!(
        event = "replay.finished",
        proposals = proposals,
        decisions = decisions,
        missing_refs = missing_refs,
        ledger_state_hash = %ledger_state_hash,
    );
}

pub fn emit_replay_divergence(field: &str, expected: &str, actual: &str) {
    warn!(event = "replay.divergence", field = %field, expected = %expected, actual = %actual);
}

/// Governance invariant broken; external gates treat this as fatal.
pub fn emit_invariant_violation(invariant: &str, value: u64) {
    error!(event = "governance.invariant_violation", invariant = %invariant, value = value);
}

pub fn emit_redaction_refused(subject_key: &str, memory_type: &str, actor: &str) {
    warn!(
        event = "redaction.unauthorized",
        subject_key = %subject_key,
        memory_type = %memory_type,
        actor = %actor,
    );
}

pub fn emit_redaction_tombstoned(proposal_id: &str, tombstone_hash: &str) {
    info!(
        event = "redaction.tombstoned",
        proposal_id = %proposal_id,
        tombstone_hash = %tombstone_hash,
    );
}
