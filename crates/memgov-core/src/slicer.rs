//! Filtered views over a provenance chain.
//!
//! A slice keeps records in chain order and carries a deterministic hash of
//! their canonical forms, so two slices over the same history compare equal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::digest::digest_bytes;
use crate::domain::Result;
use crate::provenance::{DetailValue, GovernanceRecord, ProvenanceChain, RecordType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceSlice {
    pub records: Vec<GovernanceRecord>,
    pub slice_hash: String,
}

impl ProvenanceSlice {
    fn build<'a>(records: impl Iterator<Item = &'a GovernanceRecord>) -> Result<Self> {
        let records: Vec<GovernanceRecord> = records.cloned().collect();
        let mut buf = String::new();
        for r in &records {
            buf.push_str(&r.chain_hash);
            buf.push('\n');
            buf.push_str(&r.canonical()?);
            buf.push('\n');
        }
        Ok(Self {
            slice_hash: digest_bytes(buf.as_bytes()),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct ProvenanceSlicer<'a> {
    chain: &'a ProvenanceChain,
}

impl<'a> ProvenanceSlicer<'a> {
    pub fn new(chain: &'a ProvenanceChain) -> Self {
        Self { chain }
    }

    pub fn slice_by_proposal(&self, proposal_id: &str) -> Result<ProvenanceSlice> {
        ProvenanceSlice::build(
            self.chain
                .records()
                .iter()
                .filter(|r| r.proposal_id == proposal_id),
        )
    }

    pub fn slice_by_session(&self, session_id: &str) -> Result<ProvenanceSlice> {
        ProvenanceSlice::build(
            self.chain
                .records()
                .iter()
                .filter(|r| r.session_id == session_id),
        )
    }

    pub fn slice_by_record_type(&self, record_type: RecordType) -> Result<ProvenanceSlice> {
        ProvenanceSlice::build(
            self.chain
                .records()
                .iter()
                .filter(|r| r.record_type == record_type),
        )
    }

    /// Records with `start <= seq < end`.
    pub fn slice_by_seq_range(&self, start: u64, end: u64) -> Result<ProvenanceSlice> {
        ProvenanceSlice::build(
            self.chain
                .records()
                .iter()
                .filter(|r| (start..end).contains(&r.seq)),
        )
    }

    /// The proposal's records plus those of every proposal it shares a conflict with.
    pub fn lineage(&self, proposal_id: &str) -> Result<ProvenanceSlice> {
        let mut related = BTreeSet::new();
        related.insert(proposal_id.to_string());
        for r in self.chain.records() {
            if r.record_type != RecordType::ConflictDetected {
                continue;
            }
            let other = match r.details.get("other_proposal_id") {
                Some(DetailValue::Text(id)) => id.as_str(),
                _ => continue,
            };
            if r.proposal_id == proposal_id {
                related.insert(other.to_string());
            } else if other == proposal_id {
                related.insert(r.proposal_id.clone());
            }
        }
        ProvenanceSlice::build(
            self.chain
                .records()
                .iter()
                .filter(|r| related.contains(&r.proposal_id)),
        )
    }
}
