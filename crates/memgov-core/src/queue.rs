//! Bounded proposal queue and lifecycle registry.
//!
//! Holds every proposal accepted for governance, keyed by proposal id.
//! Capacity applies only to proposals waiting on an operator decision.
//! Every refused operation is returned as data and counted; nothing is
//! silently dropped or silently re-executed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{MemoryProposal, ProposalState};
use crate::policy::PolicyDecision;

pub const THROTTLE_AT_CAPACITY: &str = "proposal_queue_at_capacity";
pub const ERR_NOT_FOUND: &str = "proposal_not_found";
pub const ERR_DOUBLE_DECISION: &str = "double_decision_rejected";
pub const ERR_ILLEGAL_TRANSITION: &str = "illegal_transition";
pub const ERR_ALREADY_REDACTED: &str = "payload_already_redacted";

/// Actor recorded for policy-driven auto-approval.
pub const POLICY_AUTO_ACTOR: &str = "policy_auto";

/// Operator-facing lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Approve,
    Reject,
    Apply,
    Retract,
    Expire,
}

impl QueueAction {
    pub fn target_state(self) -> ProposalState {
        match self {
            Self::Approve => ProposalState::Approved,
            Self::Reject => ProposalState::Rejected,
            Self::Apply => ProposalState::Applied,
            Self::Retract => ProposalState::Retracted,
            Self::Expire => ProposalState::Expired,
        }
    }

    pub fn is_decision(self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Apply => "apply",
            Self::Retract => "retract",
            Self::Expire => "expire",
        }
    }
}

/// Result of handing a classified proposal to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Accepted; `auto_approved` when policy required no decision.
    Queued {
        state: ProposalState,
        auto_approved: bool,
    },
    /// Refused for capacity; the proposal was not stored.
    Throttled { reason: String },
    /// The proposal was not in state PROPOSED.
    Refused {
        reason: String,
        current_state: ProposalState,
    },
}

/// Structured result of a lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Ok {
        proposal_id: String,
        prior_state: ProposalState,
        state: ProposalState,
    },
    Error {
        proposal_id: String,
        reason: String,
        current_state: Option<ProposalState>,
    },
}

impl DecisionOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn proposal_id(&self) -> &str {
        match self {
            Self::Ok { proposal_id, .. } | Self::Error { proposal_id, .. } => proposal_id,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub max_pending: usize,
    pub current_pending: usize,
    pub total_submitted: u64,
    pub total_auto_approved: u64,
    pub total_approved: u64,
    pub total_rejected: u64,
    pub total_expired: u64,
    pub total_applied: u64,
    pub total_retracted: u64,
    pub total_throttled: u64,
    pub double_decision_attempts: u64,
    pub illegal_transition_attempts: u64,
}

#[derive(Debug, Clone)]
pub struct ProposalQueue {
    max_pending: usize,
    entries: BTreeMap<String, MemoryProposal>,
    stats: QueueStats,
}

impl ProposalQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            entries: BTreeMap::new(),
            stats: QueueStats {
                max_pending,
                ..Default::default()
            },
        }
    }

    /// Rebuild a queue from previously exported proposals and counters.
    pub fn restore(max_pending: usize, proposals: Vec<MemoryProposal>, stats: QueueStats) -> Self {
        let entries = proposals
            .into_iter()
            .map(|p| (p.proposal_id.clone(), p))
            .collect();
        let mut queue = Self {
            max_pending,
            entries,
            stats,
        };
        queue.stats.max_pending = max_pending;
        queue
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|p| p.state == ProposalState::PendingApproval)
            .count()
    }

    /// Accept `proposal` (in state PROPOSED) according to `policy`.
    ///
    /// On acceptance the stored proposal's state is written back into
    /// `proposal` as well.
    pub fn submit(
        &mut self,
        proposal: &mut MemoryProposal,
        policy: &PolicyDecision,
    ) -> SubmitOutcome {
        if policy.requires_approval && self.pending_count() >= self.max_pending {
            self.stats.total_throttled += 1;
            return SubmitOutcome::Throttled {
                reason: THROTTLE_AT_CAPACITY.to_string(),
            };
        }

        let (target, actor) = if policy.requires_approval {
            (ProposalState::PendingApproval, "policy")
        } else {
            (ProposalState::Approved, POLICY_AUTO_ACTOR)
        };
        if let Err(err) = proposal.transition(target, actor, &policy.reason_code) {
            self.stats.illegal_transition_attempts += 1;
            return SubmitOutcome::Refused {
                reason: ERR_ILLEGAL_TRANSITION.to_string(),
                current_state: err.from,
            };
        }

        self.stats.total_submitted += 1;
        let auto_approved = !policy.requires_approval;
        if auto_approved {
            self.stats.total_auto_approved += 1;
            self.stats.total_approved += 1;
        }
        self.entries
            .insert(proposal.proposal_id.clone(), proposal.clone());
        SubmitOutcome::Queued {
            state: target,
            auto_approved,
        }
    }

    pub fn approve(&mut self, proposal_id: &str, actor: &str, reason: &str) -> DecisionOutcome {
        self.act(proposal_id, QueueAction::Approve, actor, reason)
    }

    pub fn reject(&mut self, proposal_id: &str, actor: &str, reason: &str) -> DecisionOutcome {
        self.act(proposal_id, QueueAction::Reject, actor, reason)
    }

    pub fn apply(&mut self, proposal_id: &str, actor: &str, reason: &str) -> DecisionOutcome {
        self.act(proposal_id, QueueAction::Apply, actor, reason)
    }

    pub fn retract(&mut self, proposal_id: &str, actor: &str, reason: &str) -> DecisionOutcome {
        self.act(proposal_id, QueueAction::Retract, actor, reason)
    }

    pub fn expire(&mut self, proposal_id: &str, actor: &str, reason: &str) -> DecisionOutcome {
        self.act(proposal_id, QueueAction::Expire, actor, reason)
    }

    /// Run one lifecycle action through the transition table.
    pub fn act(
        &mut self,
        proposal_id: &str,
        action: QueueAction,
        actor: &str,
        reason: &str,
    ) -> DecisionOutcome {
        let Some(proposal) = self.entries.get_mut(proposal_id) else {
            self.stats.illegal_transition_attempts += 1;
            return DecisionOutcome::Error {
                proposal_id: proposal_id.to_string(),
                reason: ERR_NOT_FOUND.to_string(),
                current_state: None,
            };
        };

        let current = proposal.state;
        if action.is_decision() && current.is_decided() {
            self.stats.double_decision_attempts += 1;
            return DecisionOutcome::Error {
                proposal_id: proposal_id.to_string(),
                reason: ERR_DOUBLE_DECISION.to_string(),
                current_state: Some(current),
            };
        }

        match proposal.transition(action.target_state(), actor, reason) {
            Ok(prior_state) => {
                let state = proposal.state;
                match action {
                    QueueAction::Approve => self.stats.total_approved += 1,
                    QueueAction::Reject => self.stats.total_rejected += 1,
                    QueueAction::Apply => self.stats.total_applied += 1,
                    QueueAction::Retract => self.stats.total_retracted += 1,
                    QueueAction::Expire => self.stats.total_expired += 1,
                }
                DecisionOutcome::Ok {
                    proposal_id: proposal_id.to_string(),
                    prior_state,
                    state,
                }
            }
            Err(err) => {
                self.stats.illegal_transition_attempts += 1;
                DecisionOutcome::Error {
                    proposal_id: proposal_id.to_string(),
                    reason: ERR_ILLEGAL_TRANSITION.to_string(),
                    current_state: Some(err.from),
                }
            }
        }
    }

    /// Replace a retracted proposal's payload with a redaction marker.
    ///
    /// `payload_hash` is kept so identity and audit hashes stay valid. A
    /// refused scrub counts as an illegal transition attempt.
    pub fn scrub_payload(
        &mut self,
        proposal_id: &str,
        marker: serde_json::Value,
    ) -> DecisionOutcome {
        let (reason, current_state) = match self.entries.get_mut(proposal_id) {
            None => (ERR_NOT_FOUND, None),
            Some(p) if p.state != ProposalState::Retracted => {
                (ERR_ILLEGAL_TRANSITION, Some(p.state))
            }
            Some(p) if p.payload == marker => (ERR_ALREADY_REDACTED, Some(p.state)),
            Some(p) => {
                p.payload = marker;
                return DecisionOutcome::Ok {
                    proposal_id: proposal_id.to_string(),
                    prior_state: p.state,
                    state: p.state,
                };
            }
        };
        self.stats.illegal_transition_attempts += 1;
        DecisionOutcome::Error {
            proposal_id: proposal_id.to_string(),
            reason: reason.to_string(),
            current_state,
        }
    }

    pub(crate) fn link_conflicts(&mut self, proposal_id: &str, conflict_ids: &[String]) {
        if let Some(p) = self.entries.get_mut(proposal_id) {
            for id in conflict_ids {
                if !p.conflict_set_ids.contains(id) {
                    p.conflict_set_ids.push(id.clone());
                }
            }
        }
    }

    pub fn get(&self, proposal_id: &str) -> Option<&MemoryProposal> {
        self.entries.get(proposal_id)
    }

    pub fn contains(&self, proposal_id: &str) -> bool {
        self.entries.contains_key(proposal_id)
    }

    /// Proposals awaiting a decision, ordered by (created_seq, proposal_id).
    pub fn pending(&self) -> Vec<&MemoryProposal> {
        let mut pending: Vec<_> = self
            .entries
            .values()
            .filter(|p| p.state == ProposalState::PendingApproval)
            .collect();
        pending.sort_by(|a, b| {
            (a.created_seq, &a.proposal_id).cmp(&(b.created_seq, &b.proposal_id))
        });
        pending
    }

    /// Every stored proposal, ordered by proposal id.
    pub fn proposals(&self) -> impl Iterator<Item = &MemoryProposal> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_pending: self.pending_count(),
            ..self.stats.clone()
        }
    }
}
