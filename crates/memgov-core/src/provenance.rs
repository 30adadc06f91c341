//! Append-only, hash-chained provenance of every governance decision.
//!
//! Each record stores `chain_hash = sha256(prev_chain_hash "\n" canonical(record))`
//! where the canonical form excludes `recorded_at` and `chain_hash`. The head
//! chain hash is the deterministic hash of the whole stream: identical input
//! streams produce identical hashes regardless of wall-clock time.
//!
//! # Detail keys per record type
//!
//! | Record type              | Keys                                                                 |
//! |--------------------------|----------------------------------------------------------------------|
//! | `proposal_created`       | memory_type, subject_key, payload_hash, created_seq, confidence, origin_event_ids, schema_version, policy_version, supersedes? |
//! | `policy_classified`      | tier, requires_approval, approval_scope, confidence_factor           |
//! | `conflict_detected`      | conflict_id, conflict_type, severity, other_proposal_id              |
//! | `proposal_queued`        | state, auto_approved                                                 |
//! | `proposal_throttled`     | pending, max_pending                                                 |
//! | lifecycle decisions      | actor, prior_state, state                                            |
//! | `illegal_transition`     | actor, action, current_state?                                        |
//! | `conflict_resolved`      | conflict_id, choice, actor                                           |
//! | `duplicate_submission`   | state                                                                |
//! | `payload_redacted`       | actor, tombstone_hash                                                |
//! | `redaction_unauthorized` | actor, memory_type                                                   |
//! | `replay_verified` / `replay_divergence` | replay_decisions_hash, ledger_state_hash, divergence_count |

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::digest::{canonical_json, digest_bytes};
use crate::domain::{GovernanceError, Result};

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    ProposalCreated,
    PolicyClassified,
    ConflictDetected,
    ProposalQueued,
    ProposalThrottled,
    ProposalApproved,
    ProposalRejected,
    ProposalExpired,
    ProposalApplied,
    ProposalRetracted,
    IllegalTransition,
    ConflictResolved,
    DuplicateSubmission,
    PayloadRedacted,
    RedactionUnauthorized,
    ReplayVerified,
    ReplayDivergence,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProposalCreated => "proposal_created",
            Self::PolicyClassified => "policy_classified",
            Self::ConflictDetected => "conflict_detected",
            Self::ProposalQueued => "proposal_queued",
            Self::ProposalThrottled => "proposal_throttled",
            Self::ProposalApproved => "proposal_approved",
            Self::ProposalRejected => "proposal_rejected",
            Self::ProposalExpired => "proposal_expired",
            Self::ProposalApplied => "proposal_applied",
            Self::ProposalRetracted => "proposal_retracted",
            Self::IllegalTransition => "illegal_transition",
            Self::ConflictResolved => "conflict_resolved",
            Self::DuplicateSubmission => "duplicate_submission",
            Self::PayloadRedacted => "payload_redacted",
            Self::RedactionUnauthorized => "redaction_unauthorized",
            Self::ReplayVerified => "replay_verified",
            Self::ReplayDivergence => "replay_divergence",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of detail value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for DetailValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for DetailValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for DetailValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for DetailValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

pub type Details = BTreeMap<String, DetailValue>;

/// Build a [`Details`] map from `key => value` pairs.
#[macro_export]
macro_rules! details {
    () => { $crate::provenance::Details::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::provenance::Details::new();
        $( map.insert($key.to_string(), $crate::provenance::DetailValue::from($value)); )+
        map
    }};
}

/// One immutable entry in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceRecord {
    pub seq: u64,
    pub record_type: RecordType,
    pub proposal_id: String,
    pub session_id: String,
    pub decision: String,
    pub reason_code: String,
    pub details: Details,
    /// Wall-clock time; excluded from every hash.
    pub recorded_at: DateTime<Utc>,
    pub chain_hash: String,
}

impl GovernanceRecord {
    /// Canonical JSON of the deterministic fields.
    pub fn canonical(&self) -> Result<String> {
        canonical_json(&serde_json::json!({
            "seq": self.seq,
            "record_type": self.record_type.as_str(),
            "proposal_id": self.proposal_id,
            "session_id": self.session_id,
            "decision": self.decision,
            "reason_code": self.reason_code,
            "details": self.details,
        }))
    }

    fn link(&self, prev_hash: &str) -> Result<String> {
        let canonical = self.canonical()?;
        let mut bytes = Vec::with_capacity(prev_hash.len() + 1 + canonical.len());
        bytes.extend_from_slice(prev_hash.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(canonical.as_bytes());
        Ok(digest_bytes(&bytes))
    }
}

/// Fields of a record before it is sequenced and chained.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub record_type: RecordType,
    pub proposal_id: String,
    pub session_id: String,
    pub decision: String,
    pub reason_code: String,
    pub details: Details,
}

impl RecordDraft {
    pub fn new(record_type: RecordType, proposal_id: &str, session_id: &str) -> Self {
        Self {
            record_type,
            proposal_id: proposal_id.to_string(),
            session_id: session_id.to_string(),
            decision: String::new(),
            reason_code: String::new(),
            details: Details::new(),
        }
    }

    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = decision.into();
        self
    }

    pub fn reason(mut self, reason_code: impl Into<String>) -> Self {
        self.reason_code = reason_code.into();
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        self.details.extend(details);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceStats {
    pub record_count: u64,
    pub by_type: BTreeMap<String, u64>,
    pub distinct_proposals: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ProvenanceChain {
    records: Vec<GovernanceRecord>,
}

impl ProvenanceChain {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Rebuild a chain from exported records, verifying every link.
    pub fn from_records(records: Vec<GovernanceRecord>) -> Result<Self> {
        let chain = Self { records };
        chain.verify_integrity()?;
        Ok(chain)
    }

    /// Sequence, chain, and append a record. Returns the stored record.
    pub fn append(&mut self, draft: RecordDraft) -> Result<&GovernanceRecord> {
        let seq = self.records.len() as u64;
        let mut record = GovernanceRecord {
            seq,
            record_type: draft.record_type,
            proposal_id: draft.proposal_id,
            session_id: draft.session_id,
            decision: draft.decision,
            reason_code: draft.reason_code,
            details: draft.details,
            recorded_at: Utc::now(),
            chain_hash: String::new(),
        };
        record.chain_hash = record.link(self.head_hash())?;
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    fn head_hash(&self) -> &str {
        self.records
            .last()
            .map(|r| r.chain_hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Hash of the ordered, canonicalized record stream.
    pub fn deterministic_hash(&self) -> String {
        self.head_hash().to_string()
    }

    /// Recompute every link; fails at the first record that does not match.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut prev = GENESIS_HASH.to_string();
        for (index, record) in self.records.iter().enumerate() {
            if record.seq != index as u64 || record.link(&prev)? != record.chain_hash {
                return Err(GovernanceError::ChainBroken { seq: index as u64 });
            }
            prev = record.chain_hash.clone();
        }
        Ok(())
    }

    /// Proposals that reached `proposal_applied` without a prior
    /// `policy_classified` record. Must always be zero.
    pub fn silent_write_count(&self) -> u64 {
        let mut classified = BTreeSet::new();
        let mut silent = BTreeSet::new();
        for r in &self.records {
            match r.record_type {
                RecordType::PolicyClassified => {
                    classified.insert(r.proposal_id.as_str());
                }
                RecordType::ProposalApplied if !classified.contains(r.proposal_id.as_str()) => {
                    silent.insert(r.proposal_id.as_str());
                }
                _ => {}
            }
        }
        silent.len() as u64
    }

    /// Conflict ids that have a `conflict_detected` record.
    pub fn surfaced_conflict_ids(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter(|r| r.record_type == RecordType::ConflictDetected)
            .filter_map(|r| match r.details.get("conflict_id") {
                Some(DetailValue::Text(id)) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn records(&self) -> &[GovernanceRecord] {
        &self.records
    }

    pub fn for_proposal(&self, proposal_id: &str) -> Vec<&GovernanceRecord> {
        self.records
            .iter()
            .filter(|r| r.proposal_id == proposal_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> ProvenanceStats {
        let mut by_type = BTreeMap::new();
        let mut proposals = BTreeSet::new();
        for r in &self.records {
            *by_type.entry(r.record_type.as_str().to_string()).or_default() += 1;
            if !r.proposal_id.is_empty() {
                proposals.insert(r.proposal_id.as_str());
            }
        }
        ProvenanceStats {
            record_count: self.records.len() as u64,
            by_type,
            distinct_proposals: proposals.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(t: RecordType, id: &str) -> RecordDraft {
        RecordDraft::new(t, id, "sess")
            .decision("ok")
            .details(details! { "confidence" => 0.9, "created_seq" => 3u64 })
    }

    #[test]
    fn test_append_assigns_monotonic_seq() {
        let mut chain = ProvenanceChain::new();
        chain.append(draft(RecordType::ProposalCreated, "p1")).unwrap();
        chain.append(draft(RecordType::PolicyClassified, "p1")).unwrap();
        let seqs: Vec<_> = chain.records().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_ne!(chain.records()[0].chain_hash, chain.records()[1].chain_hash);
    }

    #[test]
    fn test_deterministic_hash_ignores_wall_clock() {
        let build = || {
            let mut chain = ProvenanceChain::new();
            chain.append(draft(RecordType::ProposalCreated, "p1")).unwrap();
            chain.append(draft(RecordType::PolicyClassified, "p1")).unwrap();
            chain
        };
        let a = build();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = build();
        assert_eq!(a.deterministic_hash(), b.deterministic_hash());
        assert_eq!(ProvenanceChain::new().deterministic_hash(), GENESIS_HASH);
    }

    #[test]
    fn test_silent_write_detection() {
        let mut chain = ProvenanceChain::new();
        chain.append(draft(RecordType::PolicyClassified, "p1")).unwrap();
        chain.append(draft(RecordType::ProposalApplied, "p1")).unwrap();
        assert_eq!(chain.silent_write_count(), 0);

        chain.append(draft(RecordType::ProposalApplied, "p2")).unwrap();
        assert_eq!(chain.silent_write_count(), 1);
    }

    #[test]
    fn test_verify_integrity_detects_tampering() {
        let mut chain = ProvenanceChain::new();
        chain.append(draft(RecordType::ProposalCreated, "p1")).unwrap();
        chain.append(draft(RecordType::ProposalApproved, "p1")).unwrap();
        assert!(chain.verify_integrity().is_ok());

        let mut records = chain.records().to_vec();
        records[0].decision = "forged".into();
        match ProvenanceChain::from_records(records) {
            Err(GovernanceError::ChainBroken { seq }) => assert_eq!(seq, 0),
            other => panic!("expected ChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn test_detail_values_roundtrip_through_chain() {
        let mut chain = ProvenanceChain::new();
        chain
            .append(
                RecordDraft::new(RecordType::ProposalCreated, "p1", "s").details(details! {
                    "origin_event_ids" => vec!["e1".to_string()],
                    "requires_approval" => true,
                    "confidence" => 1.0,
                }),
            )
            .unwrap();
        let json = serde_json::to_string(chain.records()).unwrap();
        let back: Vec<GovernanceRecord> = serde_json::from_str(&json).unwrap();
        let rebuilt = ProvenanceChain::from_records(back).unwrap();
        assert_eq!(rebuilt.deterministic_hash(), chain.deterministic_hash());
    }

    #[test]
    fn test_stats_count_by_type() {
        let mut chain = ProvenanceChain::new();
        chain.append(draft(RecordType::ProposalCreated, "p1")).unwrap();
        chain.append(draft(RecordType::ProposalCreated, "p2")).unwrap();
        let stats = chain.stats();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.by_type.get("proposal_created"), Some(&2));
        assert_eq!(stats.distinct_proposals, 2);
    }
}
