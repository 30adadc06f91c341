//! Deterministic replay of a recorded governance stream.
//!
//! A replay feeds a fresh pipeline the recorded proposal inputs (in order),
//! then the recorded decisions (sorted by `seq`), then applies everything left
//! APPROVED. A retract that names an APPROVED proposal applies it first.
//! Malformed inputs are reported, not fatal. Two digests summarize the run:
//!
//! - `replay_decisions_hash`: canonical hash of the ordered decision log and
//!   the rejected inputs
//! - `ledger_state_hash`: canonical hash of the final per-proposal state
//!
//! Identical streams under identical configuration yield identical digests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::GovernanceConfig;
use crate::domain::digest::digest_of;
use crate::domain::{
    GovernanceError, MemoryProposal, MemoryType, ProposalInput, ProposalState, Result,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::GovernancePipeline;
use crate::queue::{DecisionOutcome, QueueAction, POLICY_AUTO_ACTOR};

/// Actor recorded for applies that replay performs on its own.
pub const REPLAY_APPLY_ACTOR: &str = "replay_auto_apply";

fn default_actor() -> String {
    "replay".to_string()
}

/// Decisions a recorded stream may carry. Apply is implied by replay itself:
/// approved proposals are applied before a retract and at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayAction {
    #[serde(alias = "APPROVE")]
    Approve,
    #[serde(alias = "REJECT")]
    Reject,
    #[serde(alias = "RETRACT")]
    Retract,
    #[serde(alias = "EXPIRE")]
    Expire,
}

impl From<ReplayAction> for QueueAction {
    fn from(action: ReplayAction) -> Self {
        match action {
            ReplayAction::Approve => QueueAction::Approve,
            ReplayAction::Reject => QueueAction::Reject,
            ReplayAction::Retract => QueueAction::Retract,
            ReplayAction::Expire => QueueAction::Expire,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDecision {
    pub seq: u64,
    pub proposal_id: String,
    pub action: ReplayAction,
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default)]
    pub reason: String,
}

/// A recorded input stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStream {
    pub proposals: Vec<ProposalInput>,
    #[serde(default)]
    pub decisions: Vec<ReplayDecision>,
}

impl ReplayStream {
    /// Load a recorded stream from a JSON file.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// One line of the replay decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub index: u64,
    pub proposal_id: String,
    pub action: String,
    pub actor: String,
    /// `ok` or the refusal reason.
    pub outcome: String,
    pub state: Option<ProposalState>,
}

/// A recorded input the pipeline refused as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedInput {
    /// Position in the stream's `proposals`.
    pub index: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub proposal_count: u64,
    pub decision_count: u64,
    pub throttled_count: u64,
    pub replay_decisions_hash: String,
    pub ledger_state_hash: String,
    pub provenance_hash: String,
    pub applied_ids: Vec<String>,
    pub rejected_ids: Vec<String>,
    pub expired_ids: Vec<String>,
    pub retracted_ids: Vec<String>,
    pub pending_ids: Vec<String>,
    /// Decision targets that no replayed input produced.
    pub missing_proposal_refs: Vec<String>,
    #[serde(default)]
    pub invalid_inputs: Vec<RejectedInput>,
    pub decision_log: Vec<DecisionLogEntry>,
}

/// Digests a replay is expected to reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayExpectation {
    pub replay_decisions_hash: String,
    pub ledger_state_hash: String,
}

impl From<&ReplayReport> for ReplayExpectation {
    fn from(report: &ReplayReport) -> Self {
        Self {
            replay_decisions_hash: report.replay_decisions_hash.clone(),
            ledger_state_hash: report.ledger_state_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayVerification {
    pub report: ReplayReport,
    pub divergence_count: u64,
    pub divergences: Vec<Divergence>,
}

impl ReplayVerification {
    pub fn is_match(&self) -> bool {
        self.divergence_count == 0
    }
}

#[derive(Serialize)]
struct DecisionDigest<'a> {
    decisions: &'a [DecisionLogEntry],
    invalid_inputs: &'a [RejectedInput],
}

#[derive(Serialize)]
struct LedgerStateEntry<'a> {
    proposal_id: &'a str,
    state: ProposalState,
    memory_type: MemoryType,
    subject_key: &'a str,
    payload_hash: &'a str,
}

/// Canonical hash of the final ledger, sorted by proposal id.
pub fn ledger_state_hash<'a>(
    proposals: impl Iterator<Item = &'a MemoryProposal>,
) -> Result<String> {
    let mut entries: Vec<LedgerStateEntry<'a>> = proposals
        .map(|p| LedgerStateEntry {
            proposal_id: &p.proposal_id,
            state: p.state,
            memory_type: p.memory_type,
            subject_key: &p.subject_key,
            payload_hash: &p.payload_hash,
        })
        .collect();
    entries.sort_by(|a, b| a.proposal_id.cmp(b.proposal_id));
    digest_of(&entries)
}

/// Replays recorded streams against a fresh pipeline.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    config: GovernanceConfig,
}

impl ReplayEngine {
    pub fn new(config: GovernanceConfig) -> Self {
        Self { config }
    }

    #[instrument(
        skip_all,
        fields(proposals = stream.proposals.len(), decisions = stream.decisions.len())
    )]
    pub fn replay(&self, stream: &ReplayStream) -> Result<ReplayReport> {
        let mut pipeline = GovernancePipeline::new(self.config.clone());
        let mut log = DecisionLog::default();
        let mut known = BTreeSet::new();
        let mut invalid_inputs = Vec::new();
        let mut throttled_count = 0;

        for (index, input) in stream.proposals.iter().enumerate() {
            let result = match pipeline.propose(input.clone()) {
                Ok(result) => result,
                Err(
                    err @ (GovernanceError::InvalidInput(_)
                    | GovernanceError::NonCanonicalPayload(_)),
                ) => {
                    warn!(index, error = %err, "replay input rejected");
                    invalid_inputs.push(RejectedInput {
                        index: index as u64,
                        reason: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };
            known.insert(result.proposal.proposal_id.clone());
            if result.throttled {
                throttled_count += 1;
            }
            if result.auto_approved {
                log.push(
                    &result.proposal.proposal_id,
                    "auto_approve",
                    POLICY_AUTO_ACTOR,
                    "ok",
                    Some(result.proposal.state),
                );
            }
        }

        let mut decisions = stream.decisions.clone();
        decisions.sort_by_key(|d| d.seq);
        let mut missing = BTreeSet::new();
        for d in &decisions {
            let action = QueueAction::from(d.action);
            if !known.contains(&d.proposal_id) {
                missing.insert(d.proposal_id.clone());
                log.push(&d.proposal_id, action.as_str(), &d.actor, "missing_proposal_ref", None);
                continue;
            }
            let state = pipeline.get(&d.proposal_id).map(|p| p.state);
            if action == QueueAction::Retract && state == Some(ProposalState::Approved) {
                let applied = pipeline.apply(&d.proposal_id, REPLAY_APPLY_ACTOR, "replay_apply")?;
                log.push_outcome(QueueAction::Apply, REPLAY_APPLY_ACTOR, &applied);
            }
            let outcome = pipeline.act(&d.proposal_id, action, &d.actor, &d.reason)?;
            log.push_outcome(action, &d.actor, &outcome);
        }

        let approved: Vec<String> = pipeline
            .proposals()
            .filter(|p| p.state == ProposalState::Approved)
            .map(|p| p.proposal_id.clone())
            .collect();
        for id in &approved {
            let outcome = pipeline.apply(id, REPLAY_APPLY_ACTOR, "replay_apply")?;
            log.push_outcome(QueueAction::Apply, REPLAY_APPLY_ACTOR, &outcome);
        }

        let ids_in = |state: ProposalState| -> Vec<String> {
            pipeline
                .proposals()
                .filter(|p| p.state == state)
                .map(|p| p.proposal_id.clone())
                .collect()
        };
        let mut pending_ids = ids_in(ProposalState::PendingApproval);
        pending_ids.extend(ids_in(ProposalState::Proposed));
        pending_ids.sort();

        let report = ReplayReport {
            proposal_count: stream.proposals.len() as u64,
            decision_count: decisions.len() as u64,
            throttled_count,
            replay_decisions_hash: digest_of(&DecisionDigest {
                decisions: &log.entries,
                invalid_inputs: &invalid_inputs,
            })?,
            ledger_state_hash: pipeline.ledger_state_hash()?,
            provenance_hash: pipeline.chain().deterministic_hash(),
            applied_ids: ids_in(ProposalState::Applied),
            rejected_ids: ids_in(ProposalState::Rejected),
            expired_ids: ids_in(ProposalState::Expired),
            retracted_ids: ids_in(ProposalState::Retracted),
            pending_ids,
            missing_proposal_refs: missing.into_iter().collect(),
            invalid_inputs,
            decision_log: log.entries,
        };

        METRICS.inc_replays();
        obs::emit_replay_finished(
            stream.proposals.len(),
            decisions.len(),
            report.missing_proposal_refs.len(),
            &report.ledger_state_hash,
        );
        Ok(report)
    }

    /// Replay and compare both digests against `expected`.
    pub fn verify(
        &self,
        stream: &ReplayStream,
        expected: &ReplayExpectation,
    ) -> Result<ReplayVerification> {
        let report = self.replay(stream)?;
        let mut divergences = Vec::new();
        for (field, want, got) in [
            (
                "replay_decisions_hash",
                &expected.replay_decisions_hash,
                &report.replay_decisions_hash,
            ),
            (
                "ledger_state_hash",
                &expected.ledger_state_hash,
                &report.ledger_state_hash,
            ),
        ] {
            if want != got {
                obs::emit_replay_divergence(field, want, got);
                divergences.push(Divergence {
                    field: field.to_string(),
                    expected: want.clone(),
                    actual: got.clone(),
                });
            }
        }
        Ok(ReplayVerification {
            report,
            divergence_count: divergences.len() as u64,
            divergences,
        })
    }
}

#[derive(Default)]
struct DecisionLog {
    entries: Vec<DecisionLogEntry>,
}

impl DecisionLog {
    fn push(
        &mut self,
        proposal_id: &str,
        action: &str,
        actor: &str,
        outcome: &str,
        state: Option<ProposalState>,
    ) {
        self.entries.push(DecisionLogEntry {
            index: self.entries.len() as u64,
            proposal_id: proposal_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            outcome: outcome.to_string(),
            state,
        });
    }

    fn push_outcome(&mut self, action: QueueAction, actor: &str, outcome: &DecisionOutcome) {
        match outcome {
            DecisionOutcome::Ok {
                proposal_id, state, ..
            } => self.push(proposal_id, action.as_str(), actor, "ok", Some(*state)),
            DecisionOutcome::Error {
                proposal_id,
                reason,
                current_state,
            } => self.push(proposal_id, action.as_str(), actor, reason, *current_state),
        }
    }
}
