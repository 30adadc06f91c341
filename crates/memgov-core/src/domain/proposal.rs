//! Memory proposals: content-addressed identity and the lifecycle state machine.

use serde::{Deserialize, Serialize};

use super::digest::compute_digest;
use super::error::{GovernanceError, Result, TransitionError};
use super::risk::RiskTier;

/// Closed set of memory entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Episode,
    SystemState,
    SessionContext,
    Project,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Episode => "episode",
            Self::SystemState => "system_state",
            Self::SessionContext => "session_context",
            Self::Project => "project",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a proposal.
///
/// ```text
/// PROPOSED ──► PENDING_APPROVAL ──► APPROVED ──► APPLIED ──► RETRACTED
///     │              │   │              ▲
///     └──────────────┼───┼──────────────┘
///                    ▼   ▼
///              REJECTED  EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Proposed,
    PendingApproval,
    Approved,
    Rejected,
    Expired,
    Applied,
    Retracted,
}

impl ProposalState {
    /// States reachable in one step from `self`.
    pub fn allowed_targets(self) -> &'static [ProposalState] {
        use ProposalState::*;
        match self {
            Proposed => &[PendingApproval, Approved],
            PendingApproval => &[Approved, Rejected, Expired],
            Approved => &[Applied],
            Applied => &[Retracted],
            Rejected | Expired | Retracted => &[],
        }
    }

    pub fn can_transition_to(self, to: ProposalState) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Whether an operator or policy decision has already been taken.
    pub fn is_decided(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Applied | Self::Retracted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Applied => "applied",
            Self::Retracted => "retracted",
        }
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_version() -> u32 {
    1
}

/// What a producer (voice, vision, tool pipeline) submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalInput {
    pub session_id: String,
    #[serde(default)]
    pub origin_event_ids: Vec<String>,
    pub memory_type: MemoryType,
    pub subject_key: String,
    pub payload: serde_json::Value,
    pub confidence: f64,
    #[serde(default = "default_version")]
    pub schema_version: u32,
    #[serde(default = "default_version")]
    pub policy_version: u32,
    /// Prior proposal this one replaces. Not part of identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

impl ProposalInput {
    pub fn new(
        session_id: impl Into<String>,
        memory_type: MemoryType,
        subject_key: impl Into<String>,
        payload: serde_json::Value,
        confidence: f64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            origin_event_ids: Vec::new(),
            memory_type,
            subject_key: subject_key.into(),
            payload,
            confidence,
            schema_version: 1,
            policy_version: 1,
            supersedes: None,
        }
    }

    pub fn with_origin_events(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.origin_event_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_policy_version(mut self, version: u32) -> Self {
        self.policy_version = version;
        self
    }

    pub fn superseding(mut self, proposal_id: impl Into<String>) -> Self {
        self.supersedes = Some(proposal_id.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "session_id must not be empty".into(),
            ));
        }
        if self.subject_key.trim().is_empty() {
            return Err(GovernanceError::InvalidInput(
                "subject_key must not be empty".into(),
            ));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(GovernanceError::InvalidInput(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A candidate mutation to the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryProposal {
    pub proposal_id: String,
    pub session_id: String,
    pub origin_event_ids: Vec<String>,
    pub memory_type: MemoryType,
    pub subject_key: String,
    pub payload: serde_json::Value,
    pub payload_hash: String,
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub created_seq: u64,
    pub schema_version: u32,
    pub policy_version: u32,
    pub state: ProposalState,
    pub decision_actor: Option<String>,
    pub decision_reason: Option<String>,
    pub conflict_set_ids: Vec<String>,
}

/// Hash of the canonical payload; key order never affects it.
pub fn payload_hash(payload: &serde_json::Value) -> Result<String> {
    compute_digest(payload)
}

/// Deterministic proposal identity.
///
/// Origin events, confidence and sequence are deliberately not inputs:
/// resubmitting the same content yields the same id.
pub fn derive_proposal_id(
    session_id: &str,
    memory_type: MemoryType,
    subject_key: &str,
    payload_hash: &str,
    schema_version: u32,
    policy_version: u32,
) -> Result<String> {
    compute_digest(&serde_json::json!({
        "session_id": session_id,
        "memory_type": memory_type.as_str(),
        "subject_key": subject_key,
        "payload_hash": payload_hash,
        "schema_version": schema_version,
        "policy_version": policy_version,
    }))
}

impl MemoryProposal {
    /// Build a canonical proposal in state `PROPOSED`.
    pub fn create(input: ProposalInput, risk_tier: RiskTier, created_seq: u64) -> Result<Self> {
        input.validate()?;
        let payload_hash = payload_hash(&input.payload)?;
        let proposal_id = derive_proposal_id(
            &input.session_id,
            input.memory_type,
            &input.subject_key,
            &payload_hash,
            input.schema_version,
            input.policy_version,
        )?;

        Ok(Self {
            proposal_id,
            session_id: input.session_id,
            origin_event_ids: input.origin_event_ids,
            memory_type: input.memory_type,
            subject_key: input.subject_key,
            payload: input.payload,
            payload_hash,
            confidence: input.confidence,
            risk_tier,
            created_seq,
            schema_version: input.schema_version,
            policy_version: input.policy_version,
            state: ProposalState::Proposed,
            decision_actor: None,
            decision_reason: None,
            conflict_set_ids: Vec::new(),
        })
    }

    /// Move to `to`, returning the previous state.
    ///
    /// The proposal is left untouched when the move is not in the table.
    pub fn transition(
        &mut self,
        to: ProposalState,
        actor: &str,
        reason: &str,
    ) -> std::result::Result<ProposalState, TransitionError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        self.state = to;
        self.decision_actor = Some(actor.to_string());
        self.decision_reason = Some(reason.to_string());
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_input(value: i64) -> ProposalInput {
        ProposalInput::new(
            "sess-1",
            MemoryType::Fact,
            "user.age",
            serde_json::json!(value),
            0.9,
        )
    }

    #[test]
    fn test_proposal_id_golden_value() {
        let p = MemoryProposal::create(age_input(30), RiskTier::GuardedHigh, 0).unwrap();
        assert_eq!(
            p.payload_hash,
            "624b60c58c9d8bfb6ff1886c2fd605d2adeb6ea4da576068201b6c6958ce93f4"
        );
        assert_eq!(
            p.proposal_id,
            "05e5a996862701b7279de2fcf906ddd5fa052c333e9bc6fcd6960b3287da896f"
        );
    }

    #[test]
    fn test_identity_ignores_origin_confidence_and_seq() {
        let a = MemoryProposal::create(age_input(30), RiskTier::GuardedHigh, 1).unwrap();
        let mut input = age_input(30).with_origin_events(["evt-9"]);
        input.confidence = 0.2;
        let b = MemoryProposal::create(input, RiskTier::AutoLow, 99).unwrap();
        assert_eq!(a.proposal_id, b.proposal_id);
    }

    #[test]
    fn test_payload_key_order_does_not_change_identity() {
        let mut a = age_input(0);
        a.payload = serde_json::json!({ "city": "Oslo", "zip": "0150" });
        let mut b = age_input(0);
        b.payload = serde_json::json!({ "zip": "0150", "city": "Oslo" });
        let pa = MemoryProposal::create(a, RiskTier::AutoLow, 0).unwrap();
        let pb = MemoryProposal::create(b, RiskTier::AutoLow, 1).unwrap();
        assert_eq!(pa.payload_hash, pb.payload_hash);
        assert_eq!(pa.proposal_id, pb.proposal_id);
    }

    #[test]
    fn test_versions_change_identity() {
        let a = MemoryProposal::create(age_input(30), RiskTier::AutoLow, 0).unwrap();
        let b = MemoryProposal::create(age_input(30).with_schema_version(2), RiskTier::AutoLow, 0)
            .unwrap();
        let c = MemoryProposal::create(age_input(30).with_policy_version(2), RiskTier::AutoLow, 0)
            .unwrap();
        assert_ne!(a.proposal_id, b.proposal_id);
        assert_ne!(a.proposal_id, c.proposal_id);
        assert_ne!(b.proposal_id, c.proposal_id);
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let mut input = age_input(30);
        input.confidence = 1.5;
        assert!(matches!(
            MemoryProposal::create(input, RiskTier::AutoLow, 0),
            Err(GovernanceError::InvalidInput(_))
        ));

        let mut input = age_input(30);
        input.subject_key = "  ".into();
        assert!(MemoryProposal::create(input, RiskTier::AutoLow, 0).is_err());

        let mut input = age_input(30);
        input.confidence = f64::NAN;
        assert!(MemoryProposal::create(input, RiskTier::AutoLow, 0).is_err());
    }

    #[test]
    fn test_transition_table() {
        use ProposalState::*;
        assert!(Proposed.can_transition_to(PendingApproval));
        assert!(Proposed.can_transition_to(Approved));
        assert!(PendingApproval.can_transition_to(Expired));
        assert!(Approved.can_transition_to(Applied));
        assert!(Applied.can_transition_to(Retracted));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Proposed.can_transition_to(Applied));
        for terminal in [Rejected, Expired, Retracted] {
            assert!(terminal.is_terminal());
        }
        assert!(!Applied.is_terminal());
    }

    #[test]
    fn test_transition_records_actor_and_returns_prior_state() {
        let mut p = MemoryProposal::create(age_input(30), RiskTier::GuardedMedium, 0).unwrap();
        let prior = p
            .transition(ProposalState::PendingApproval, "policy", "guarded")
            .unwrap();
        assert_eq!(prior, ProposalState::Proposed);
        assert_eq!(p.state, ProposalState::PendingApproval);
        assert_eq!(p.decision_actor.as_deref(), Some("policy"));
    }

    #[test]
    fn test_illegal_transition_leaves_state_untouched() {
        let mut p = MemoryProposal::create(age_input(30), RiskTier::GuardedMedium, 0).unwrap();
        let err = p
            .transition(ProposalState::Applied, "operator", "skip ahead")
            .unwrap_err();
        assert_eq!(err.from, ProposalState::Proposed);
        assert_eq!(err.to, ProposalState::Applied);
        assert_eq!(p.state, ProposalState::Proposed);
        assert!(p.decision_actor.is_none());
    }
}
