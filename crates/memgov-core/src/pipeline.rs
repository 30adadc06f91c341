//! Governance pipeline: the single writer over proposals, conflicts and provenance.
//!
//! `propose` runs create → classify → detect conflicts → submit, appending
//! provenance at each step in that order. Lifecycle actions delegate to the
//! queue and append either the matching record or an `illegal_transition`
//! record, so refused attempts are audited too.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::GovernanceConfig;
use crate::conflict::{ConflictDetector, ConflictRecord, ConflictStats, ResolutionChoice};
use crate::details;
use crate::domain::{MemoryProposal, ProposalInput, ProposalState, Result, RiskTier};
use crate::metrics::METRICS;
use crate::obs::{self, PipelineSpan};
use crate::policy::{PolicyClassifier, PolicyDecision};
use crate::provenance::{ProvenanceChain, ProvenanceStats, RecordDraft, RecordType};
use crate::queue::{DecisionOutcome, ProposalQueue, QueueAction, QueueStats, SubmitOutcome};
use crate::replay::{self, ReplayVerification};

/// Payload stored in place of redacted content.
pub fn redaction_marker() -> serde_json::Value {
    serde_json::json!({ "redacted": true })
}

/// Outcome of `propose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceResult {
    pub proposal: MemoryProposal,
    pub policy: PolicyDecision,
    pub conflicts: Vec<ConflictRecord>,
    pub queued: bool,
    pub throttled: bool,
    pub throttle_reason: Option<String>,
    pub auto_approved: bool,
    /// The proposal id already existed; nothing new was queued.
    #[serde(default)]
    pub duplicate: bool,
}

/// Aggregate view consumed by health and regression gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceReport {
    pub queue_stats: QueueStats,
    pub conflict_stats: ConflictStats,
    pub provenance_stats: ProvenanceStats,
    pub provenance_hash: String,
    pub silent_write_count: u64,
    pub illegal_transition_attempts: u64,
    pub double_decision_attempts: u64,
    pub conflict_unsurfaced_count: u64,
    pub unresolved_conflicts: u64,
}

impl GovernanceReport {
    /// Both zero-tolerance invariants hold.
    pub fn invariants_hold(&self) -> bool {
        self.silent_write_count == 0 && self.conflict_unsurfaced_count == 0
    }
}

#[derive(Debug)]
pub struct GovernancePipeline {
    pipeline_id: String,
    config: GovernanceConfig,
    classifier: PolicyClassifier,
    detector: ConflictDetector,
    queue: ProposalQueue,
    chain: ProvenanceChain,
    policies: BTreeMap<String, PolicyDecision>,
    next_seq: u64,
}

impl Default for GovernancePipeline {
    fn default() -> Self {
        Self::new(GovernanceConfig::default())
    }
}

impl GovernancePipeline {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            pipeline_id: Uuid::new_v4().to_string(),
            classifier: PolicyClassifier::new(config.policy),
            detector: ConflictDetector::new(config.recency_window),
            queue: ProposalQueue::new(config.max_pending),
            chain: ProvenanceChain::new(),
            policies: BTreeMap::new(),
            next_seq: 0,
            config,
        }
    }

    /// Reassemble a pipeline from previously exported state.
    pub(crate) fn from_parts(
        config: GovernanceConfig,
        queue: ProposalQueue,
        chain: ProvenanceChain,
        policies: BTreeMap<String, PolicyDecision>,
        conflicts: Vec<ConflictRecord>,
    ) -> Self {
        let mut detector = ConflictDetector::new(config.recency_window);
        for p in queue.proposals() {
            detector.register(p);
        }
        detector.record(&conflicts);
        let next_seq = queue
            .proposals()
            .map(|p| p.created_seq + 1)
            .max()
            .unwrap_or(0);
        let next_seq = next_seq.max(chain_max_created_seq(&chain));
        Self {
            pipeline_id: Uuid::new_v4().to_string(),
            classifier: PolicyClassifier::new(config.policy),
            detector,
            queue,
            chain,
            policies,
            next_seq,
            config,
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn propose(&mut self, input: ProposalInput) -> Result<GovernanceResult> {
        let _span = PipelineSpan::enter(&self.pipeline_id, "propose");
        let supersedes = input.supersedes.clone();
        // Fail closed until the classifier has spoken.
        let mut proposal = MemoryProposal::create(input, RiskTier::GuardedHigh, self.next_seq)?;

        if let Some(existing) = self.queue.get(&proposal.proposal_id) {
            return self.record_duplicate(existing.clone());
        }
        self.next_seq += 1;

        METRICS.inc_proposals_created();
        obs::emit_proposal_created(
            &proposal.proposal_id,
            proposal.memory_type.as_str(),
            &proposal.subject_key,
            proposal.created_seq,
        );
        let mut created = details! {
            "memory_type" => proposal.memory_type.as_str(),
            "subject_key" => proposal.subject_key.as_str(),
            "payload_hash" => proposal.payload_hash.as_str(),
            "created_seq" => proposal.created_seq,
            "confidence" => proposal.confidence,
            "origin_event_ids" => proposal.origin_event_ids.clone(),
            "schema_version" => proposal.schema_version,
            "policy_version" => proposal.policy_version,
        };
        if let Some(prior) = supersedes {
            created.insert("supersedes".into(), prior.into());
        }
        self.chain.append(
            RecordDraft::new(
                RecordType::ProposalCreated,
                &proposal.proposal_id,
                &proposal.session_id,
            )
            .decision(ProposalState::Proposed.as_str())
            .reason("proposal_created")
            .details(created),
        )?;

        let policy = self.classifier.classify(&proposal);
        proposal.risk_tier = policy.tier;
        obs::emit_proposal_classified(
            &proposal.proposal_id,
            policy.tier.as_str(),
            &policy.reason_code,
        );
        self.chain.append(
            RecordDraft::new(
                RecordType::PolicyClassified,
                &proposal.proposal_id,
                &proposal.session_id,
            )
            .decision(policy.tier.as_str())
            .reason(policy.reason_code.clone())
            .details(details! {
                "tier" => policy.tier.as_str(),
                "requires_approval" => policy.requires_approval,
                "approval_scope" => policy.approval_scope.as_str(),
                "confidence_factor" => policy.confidence_factor,
            }),
        )?;

        let conflicts = self.detector.detect(&proposal)?;
        for c in &conflicts {
            obs::emit_conflict_detected(
                &c.conflict_id,
                c.conflict_type.as_str(),
                &c.existing_proposal_id,
                &c.incoming_proposal_id,
            );
            self.chain.append(
                RecordDraft::new(
                    RecordType::ConflictDetected,
                    &proposal.proposal_id,
                    &proposal.session_id,
                )
                .decision(c.conflict_type.as_str())
                .reason(c.conflict_type.as_str())
                .details(details! {
                    "conflict_id" => c.conflict_id.as_str(),
                    "conflict_type" => c.conflict_type.as_str(),
                    "severity" => c.severity.as_str(),
                    "other_proposal_id" => c.existing_proposal_id.as_str(),
                }),
            )?;
        }
        proposal.conflict_set_ids = conflicts.iter().map(|c| c.conflict_id.clone()).collect();

        let mut result = GovernanceResult {
            proposal: proposal.clone(),
            policy: policy.clone(),
            conflicts,
            queued: false,
            throttled: false,
            throttle_reason: None,
            auto_approved: false,
            duplicate: false,
        };

        match self.queue.submit(&mut proposal, &policy) {
            SubmitOutcome::Queued {
                state,
                auto_approved,
            } => {
                self.detector.register(&proposal);
                self.detector.record(&result.conflicts);
                for c in &result.conflicts {
                    self.queue.link_conflicts(
                        &c.existing_proposal_id,
                        std::slice::from_ref(&c.conflict_id),
                    );
                }
                self.policies
                    .insert(proposal.proposal_id.clone(), policy.clone());

                obs::emit_proposal_queued(&proposal.proposal_id, state.as_str(), auto_approved);
                self.chain.append(
                    RecordDraft::new(
                        RecordType::ProposalQueued,
                        &proposal.proposal_id,
                        &proposal.session_id,
                    )
                    .decision(state.as_str())
                    .reason(policy.reason_code.clone())
                    .details(details! {
                        "state" => state.as_str(),
                        "auto_approved" => auto_approved,
                    }),
                )?;
                if auto_approved {
                    self.chain.append(
                        RecordDraft::new(
                            RecordType::ProposalApproved,
                            &proposal.proposal_id,
                            &proposal.session_id,
                        )
                        .decision(ProposalState::Approved.as_str())
                        .reason(policy.reason_code.clone())
                        .details(details! {
                            "actor" => crate::queue::POLICY_AUTO_ACTOR,
                            "prior_state" => ProposalState::Proposed.as_str(),
                            "state" => ProposalState::Approved.as_str(),
                        }),
                    )?;
                }
                result.queued = true;
                result.auto_approved = auto_approved;
            }
            SubmitOutcome::Throttled { reason } => {
                let pending = self.queue.pending_count();
                METRICS.inc_proposals_throttled();
                obs::emit_proposal_throttled(&proposal.proposal_id, &reason, pending);
                self.chain.append(
                    RecordDraft::new(
                        RecordType::ProposalThrottled,
                        &proposal.proposal_id,
                        &proposal.session_id,
                    )
                    .decision("throttled")
                    .reason(reason.clone())
                    .details(details! {
                        "pending" => pending,
                        "max_pending" => self.config.max_pending,
                    }),
                )?;
                result.throttled = true;
                result.throttle_reason = Some(reason);
            }
            SubmitOutcome::Refused {
                reason,
                current_state,
            } => {
                METRICS.inc_illegal_transitions();
                obs::emit_illegal_transition(&proposal.proposal_id, "submit", &reason);
                self.chain.append(
                    RecordDraft::new(
                        RecordType::IllegalTransition,
                        &proposal.proposal_id,
                        &proposal.session_id,
                    )
                    .decision(reason.clone())
                    .reason(reason)
                    .details(details! {
                        "action" => "submit",
                        "current_state" => current_state.as_str(),
                    }),
                )?;
            }
        }

        result.proposal = proposal;
        Ok(result)
    }

    fn record_duplicate(&mut self, existing: MemoryProposal) -> Result<GovernanceResult> {
        debug!(proposal_id = %existing.proposal_id, "duplicate submission");
        self.chain.append(
            RecordDraft::new(
                RecordType::DuplicateSubmission,
                &existing.proposal_id,
                &existing.session_id,
            )
            .decision("duplicate")
            .reason("idempotent_resubmission")
            .details(details! { "state" => existing.state.as_str() }),
        )?;
        let policy = match self.policies.get(&existing.proposal_id) {
            Some(p) => p.clone(),
            None => self.classifier.classify(&existing),
        };
        Ok(GovernanceResult {
            proposal: existing,
            policy,
            conflicts: Vec::new(),
            queued: false,
            throttled: false,
            throttle_reason: None,
            auto_approved: false,
            duplicate: true,
        })
    }

    pub fn approve(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.act(proposal_id, QueueAction::Approve, actor, reason)
    }

    pub fn reject(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.act(proposal_id, QueueAction::Reject, actor, reason)
    }

    /// Mark an approved proposal APPLIED. The storage write itself is the
    /// caller's job once this returns `Ok`.
    pub fn apply(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.act(proposal_id, QueueAction::Apply, actor, reason)
    }

    pub fn retract(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.act(proposal_id, QueueAction::Retract, actor, reason)
    }

    pub fn expire(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.act(proposal_id, QueueAction::Expire, actor, reason)
    }

    /// Expire, in pending order, every pending proposal created before `cutoff_seq`.
    pub fn expire_pending_before(
        &mut self,
        cutoff_seq: u64,
        actor: &str,
    ) -> Result<Vec<DecisionOutcome>> {
        let stale: Vec<String> = self
            .queue
            .pending()
            .into_iter()
            .filter(|p| p.created_seq < cutoff_seq)
            .map(|p| p.proposal_id.clone())
            .collect();
        stale
            .iter()
            .map(|id| self.expire(id, actor, "ttl_elapsed"))
            .collect()
    }

    pub fn act(
        &mut self,
        proposal_id: &str,
        action: QueueAction,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        let _span = PipelineSpan::enter(&self.pipeline_id, action.as_str());
        let reason_code = if reason.is_empty() { action.as_str() } else { reason };
        let outcome = self.queue.act(proposal_id, action, actor, reason_code);
        let session_id = self.session_of(proposal_id);

        match &outcome {
            DecisionOutcome::Ok {
                prior_state, state, ..
            } => {
                self.detector.update_state(proposal_id, *state);
                if action == QueueAction::Apply {
                    METRICS.inc_decisions_applied();
                }
                obs::emit_decision_applied(
                    proposal_id,
                    action.as_str(),
                    prior_state.as_str(),
                    state.as_str(),
                );
                self.chain.append(
                    RecordDraft::new(record_type_for(action), proposal_id, &session_id)
                        .decision(state.as_str())
                        .reason(reason_code)
                        .details(details! {
                            "actor" => actor,
                            "prior_state" => prior_state.as_str(),
                            "state" => state.as_str(),
                        }),
                )?;
            }
            DecisionOutcome::Error {
                reason: error_reason,
                current_state,
                ..
            } => {
                METRICS.inc_illegal_transitions();
                obs::emit_illegal_transition(proposal_id, action.as_str(), error_reason);
                let mut detail = details! {
                    "actor" => actor,
                    "action" => action.as_str(),
                };
                if let Some(state) = current_state {
                    detail.insert("current_state".into(), state.as_str().into());
                }
                self.chain.append(
                    RecordDraft::new(RecordType::IllegalTransition, proposal_id, &session_id)
                        .decision(error_reason.clone())
                        .reason(reason_code)
                        .details(detail),
                )?;
            }
        }
        Ok(outcome)
    }

    pub fn resolve_conflict(
        &mut self,
        conflict_id: &str,
        choice: ResolutionChoice,
        actor: &str,
    ) -> Result<ConflictRecord> {
        let record = self.detector.resolve(conflict_id, choice, actor)?;
        let session_id = self.session_of(&record.incoming_proposal_id);
        self.chain.append(
            RecordDraft::new(
                RecordType::ConflictResolved,
                &record.incoming_proposal_id,
                &session_id,
            )
            .decision(choice.as_str())
            .reason("operator_resolution")
            .details(details! {
                "conflict_id" => conflict_id,
                "choice" => choice.as_str(),
                "actor" => actor,
            }),
        )?;
        Ok(record)
    }

    /// Scrub a retracted proposal's stored payload. Irreversible.
    ///
    /// A refused scrub is counted and recorded as an illegal transition.
    pub fn redact_payload(
        &mut self,
        proposal_id: &str,
        actor: &str,
        tombstone_hash: &str,
    ) -> Result<DecisionOutcome> {
        let outcome = self.queue.scrub_payload(proposal_id, redaction_marker());
        let session_id = self.session_of(proposal_id);
        let (record_type, decision) = match &outcome {
            DecisionOutcome::Ok { .. } => (RecordType::PayloadRedacted, "redacted".to_string()),
            DecisionOutcome::Error { reason, .. } => {
                METRICS.inc_illegal_transitions();
                obs::emit_illegal_transition(proposal_id, "redact", reason);
                (RecordType::IllegalTransition, reason.clone())
            }
        };
        self.chain.append(
            RecordDraft::new(record_type, proposal_id, &session_id)
                .decision(decision)
                .reason("payload_redaction")
                .details(details! {
                    "actor" => actor,
                    "tombstone_hash" => tombstone_hash,
                }),
        )?;
        Ok(outcome)
    }

    /// Audit a refused redaction attempt.
    pub fn record_unauthorized_redaction(&mut self, proposal_id: &str, actor: &str) -> Result<()> {
        let session_id = self.session_of(proposal_id);
        let memory_type = self
            .queue
            .get(proposal_id)
            .map(|p| p.memory_type.as_str())
            .unwrap_or_default();
        self.chain.append(
            RecordDraft::new(RecordType::RedactionUnauthorized, proposal_id, &session_id)
                .decision("refused")
                .reason("missing_authorization")
                .details(details! {
                    "actor" => actor,
                    "memory_type" => memory_type,
                }),
        )?;
        Ok(())
    }

    /// Append the verdict of a replay verification to the live chain.
    pub fn audit_replay(&mut self, verification: &ReplayVerification) -> Result<()> {
        let record_type = if verification.divergence_count == 0 {
            RecordType::ReplayVerified
        } else {
            RecordType::ReplayDivergence
        };
        self.chain.append(
            RecordDraft::new(record_type, "", "")
                .decision(record_type.as_str())
                .reason(if verification.divergence_count == 0 {
                    "hashes_match"
                } else {
                    "hash_mismatch"
                })
                .details(details! {
                    "replay_decisions_hash" => verification.report.replay_decisions_hash.as_str(),
                    "ledger_state_hash" => verification.report.ledger_state_hash.as_str(),
                    "divergence_count" => verification.divergence_count,
                }),
        )?;
        Ok(())
    }

    fn session_of(&self, proposal_id: &str) -> String {
        self.queue
            .get(proposal_id)
            .map(|p| p.session_id.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, proposal_id: &str) -> Option<&MemoryProposal> {
        self.queue.get(proposal_id)
    }

    pub fn policy_for(&self, proposal_id: &str) -> Option<&PolicyDecision> {
        self.policies.get(proposal_id)
    }

    pub fn pending(&self) -> Vec<&MemoryProposal> {
        self.queue.pending()
    }

    pub fn proposals(&self) -> impl Iterator<Item = &MemoryProposal> {
        self.queue.proposals()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.detector.conflicts()
    }

    pub fn unresolved_conflicts(&self) -> u64 {
        self.detector.unresolved_count()
    }

    pub fn chain(&self) -> &ProvenanceChain {
        &self.chain
    }

    pub(crate) fn queue(&self) -> &ProposalQueue {
        &self.queue
    }

    pub(crate) fn policies(&self) -> &BTreeMap<String, PolicyDecision> {
        &self.policies
    }

    /// Hash of {proposal_id, state, memory_type, subject_key, payload_hash}
    /// over every stored proposal, sorted by id.
    pub fn ledger_state_hash(&self) -> Result<String> {
        replay::ledger_state_hash(self.queue.proposals())
    }

    pub fn report(&self) -> GovernanceReport {
        let queue_stats = self.queue.stats();
        let surfaced = self.chain.surfaced_conflict_ids();
        let conflict_unsurfaced_count = self
            .detector
            .conflicts()
            .filter(|c| !surfaced.contains(c.conflict_id.as_str()))
            .count() as u64;
        let silent_write_count = self.chain.silent_write_count();

        if silent_write_count > 0 {
            obs::emit_invariant_violation("silent_write_count", silent_write_count);
        }
        if conflict_unsurfaced_count > 0 {
            obs::emit_invariant_violation("conflict_unsurfaced_count", conflict_unsurfaced_count);
        }

        GovernanceReport {
            illegal_transition_attempts: queue_stats.illegal_transition_attempts,
            double_decision_attempts: queue_stats.double_decision_attempts,
            queue_stats,
            conflict_stats: self.detector.stats(),
            provenance_stats: self.chain.stats(),
            provenance_hash: self.chain.deterministic_hash(),
            silent_write_count,
            conflict_unsurfaced_count,
            unresolved_conflicts: self.detector.unresolved_count(),
        }
    }
}

fn record_type_for(action: QueueAction) -> RecordType {
    match action {
        QueueAction::Approve => RecordType::ProposalApproved,
        QueueAction::Reject => RecordType::ProposalRejected,
        QueueAction::Apply => RecordType::ProposalApplied,
        QueueAction::Retract => RecordType::ProposalRetracted,
        QueueAction::Expire => RecordType::ProposalExpired,
    }
}

/// Throttled proposals consume a created_seq without being stored, so the
/// chain is the authority on the next free sequence number.
fn chain_max_created_seq(chain: &ProvenanceChain) -> u64 {
    chain
        .records()
        .iter()
        .filter(|r| r.record_type == RecordType::ProposalCreated)
        .filter_map(|r| match r.details.get("created_seq") {
            Some(crate::provenance::DetailValue::Int(seq)) => u64::try_from(*seq).ok(),
            _ => None,
        })
        .map(|seq| seq + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemoryType;
    use crate::queue::{ERR_DOUBLE_DECISION, ERR_ILLEGAL_TRANSITION, ERR_NOT_FOUND};

    fn fact(key: &str, value: serde_json::Value) -> ProposalInput {
        ProposalInput::new("sess-1", MemoryType::Fact, key, value, 0.9)
    }

    fn record_types(p: &GovernancePipeline, id: &str) -> Vec<RecordType> {
        p.chain().for_proposal(id).iter().map(|r| r.record_type).collect()
    }

    #[test]
    fn test_propose_records_steps_in_fixed_order() {
        let mut p = GovernancePipeline::default();
        let first = p.propose(fact("user.age", serde_json::json!(30))).unwrap();
        let second = p.propose(fact("user.age", serde_json::json!(31))).unwrap();
        assert_eq!(second.conflicts.len(), 1);

        assert_eq!(
            record_types(&p, &first.proposal.proposal_id),
            vec![
                RecordType::ProposalCreated,
                RecordType::PolicyClassified,
                RecordType::ProposalQueued
            ]
        );
        assert_eq!(
            record_types(&p, &second.proposal.proposal_id),
            vec![
                RecordType::ProposalCreated,
                RecordType::PolicyClassified,
                RecordType::ConflictDetected,
                RecordType::ProposalQueued
            ]
        );
    }

    #[test]
    fn test_conflicts_link_both_proposals() {
        let mut p = GovernancePipeline::default();
        let first = p.propose(fact("user.age", serde_json::json!(30))).unwrap();
        let second = p.propose(fact("user.age", serde_json::json!(31))).unwrap();
        let conflict_id = &second.conflicts[0].conflict_id;

        assert!(p
            .get(&first.proposal.proposal_id)
            .unwrap()
            .conflict_set_ids
            .contains(conflict_id));
        assert_eq!(
            p.get(&second.proposal.proposal_id).unwrap().conflict_set_ids,
            vec![conflict_id.clone()]
        );
        assert_eq!(p.report().conflict_unsurfaced_count, 0);
        assert_eq!(p.report().unresolved_conflicts, 1);
    }

    #[test]
    fn test_failed_action_is_audited() {
        let mut p = GovernancePipeline::default();
        let r = p.propose(fact("k", serde_json::json!(1))).unwrap();
        let id = r.proposal.proposal_id;

        let out = p.apply(&id, "op", "").unwrap();
        assert_eq!(out.error_reason(), Some(ERR_ILLEGAL_TRANSITION));
        assert_eq!(
            record_types(&p, &id).last(),
            Some(&RecordType::IllegalTransition)
        );

        p.approve(&id, "op", "looks right").unwrap();
        let again = p.approve(&id, "op", "again").unwrap();
        assert_eq!(again.error_reason(), Some(ERR_DOUBLE_DECISION));

        let report = p.report();
        assert_eq!(report.illegal_transition_attempts, 1);
        assert_eq!(report.double_decision_attempts, 1);

        let missing = p.approve("missing", "op", "").unwrap();
        assert_eq!(missing.error_reason(), Some(ERR_NOT_FOUND));
    }

    #[test]
    fn test_duplicate_submission_is_idempotent() {
        let mut p = GovernancePipeline::default();
        let a = p.propose(fact("k", serde_json::json!(1))).unwrap();
        let b = p.propose(fact("k", serde_json::json!(1))).unwrap();
        assert!(b.duplicate);
        assert!(!b.queued);
        assert_eq!(a.proposal.proposal_id, b.proposal.proposal_id);
        assert_eq!(p.report().queue_stats.total_submitted, 1);
        assert_eq!(p.report().conflict_stats.total, 0);
    }

    #[test]
    fn test_expire_pending_before_cutoff() {
        let mut p = GovernancePipeline::default();
        let old = p.propose(fact("a", serde_json::json!(1))).unwrap();
        let new = p.propose(fact("b", serde_json::json!(1))).unwrap();
        let outcomes = p.expire_pending_before(1, "ttl-sweeper").unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            p.get(&old.proposal.proposal_id).unwrap().state,
            ProposalState::Expired
        );
        assert_eq!(
            p.get(&new.proposal.proposal_id).unwrap().state,
            ProposalState::PendingApproval
        );
    }

    #[test]
    fn test_resolve_conflict_appends_record() {
        let mut p = GovernancePipeline::default();
        p.propose(fact("k", serde_json::json!(1))).unwrap();
        let r = p.propose(fact("k", serde_json::json!(2))).unwrap();
        let id = r.conflicts[0].conflict_id.clone();
        p.resolve_conflict(&id, ResolutionChoice::Supersede, "op").unwrap();
        assert_eq!(p.unresolved_conflicts(), 0);
        assert_eq!(
            p.chain().records().last().unwrap().record_type,
            RecordType::ConflictResolved
        );
    }
}
