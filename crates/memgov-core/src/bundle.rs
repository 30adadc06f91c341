//! Export and import of a pipeline's full governance state.
//!
//! `bundle_hash` is the digest of the canonical bundle with the hash field
//! removed. Import refuses any bundle whose hash, declared counts, provenance
//! head or chain links do not check out.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GovernanceConfig;
use crate::conflict::ConflictRecord;
use crate::domain::digest::compute_digest;
use crate::domain::{GovernanceError, MemoryProposal, Result};
use crate::pipeline::GovernancePipeline;
use crate::policy::PolicyDecision;
use crate::provenance::{GovernanceRecord, ProvenanceChain};
use crate::queue::{ProposalQueue, QueueStats};

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleData {
    pub proposals: Vec<MemoryProposal>,
    pub policies: BTreeMap<String, PolicyDecision>,
    pub conflicts: Vec<ConflictRecord>,
    pub provenance: Vec<GovernanceRecord>,
    pub queue_stats: QueueStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceBundle {
    pub version: u32,
    pub proposal_count: u64,
    pub provenance_count: u64,
    pub conflict_count: u64,
    pub provenance_hash: String,
    pub data: BundleData,
    pub bundle_hash: String,
}

impl GovernanceBundle {
    /// Digest of this bundle without its `bundle_hash` field.
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("bundle_hash");
        }
        compute_digest(&value)
    }
}

impl GovernancePipeline {
    pub fn export_bundle(&self) -> Result<GovernanceBundle> {
        let data = BundleData {
            proposals: self.proposals().cloned().collect(),
            policies: self.policies().clone(),
            conflicts: self.conflicts().cloned().collect(),
            provenance: self.chain().records().to_vec(),
            queue_stats: self.queue().stats(),
        };
        let mut bundle = GovernanceBundle {
            version: BUNDLE_VERSION,
            proposal_count: data.proposals.len() as u64,
            provenance_count: data.provenance.len() as u64,
            conflict_count: data.conflicts.len() as u64,
            provenance_hash: self.chain().deterministic_hash(),
            data,
            bundle_hash: String::new(),
        };
        bundle.bundle_hash = bundle.compute_hash()?;
        Ok(bundle)
    }
}

/// Verify `bundle` and rebuild a pipeline from it.
pub fn import_bundle(
    config: GovernanceConfig,
    bundle: GovernanceBundle,
) -> Result<GovernancePipeline> {
    if bundle.version != BUNDLE_VERSION {
        return Err(GovernanceError::InvalidBundle(format!(
            "unsupported bundle version {}",
            bundle.version
        )));
    }
    let actual = bundle.compute_hash()?;
    if actual != bundle.bundle_hash {
        return Err(GovernanceError::DigestMismatch {
            expected: bundle.bundle_hash,
            actual,
        });
    }
    for (name, declared, found) in [
        ("proposal_count", bundle.proposal_count, bundle.data.proposals.len()),
        ("provenance_count", bundle.provenance_count, bundle.data.provenance.len()),
        ("conflict_count", bundle.conflict_count, bundle.data.conflicts.len()),
    ] {
        if declared != found as u64 {
            return Err(GovernanceError::InvalidBundle(format!(
                "{name} declares {declared} but data holds {found}"
            )));
        }
    }

    let chain = ProvenanceChain::from_records(bundle.data.provenance)?;
    let head = chain.deterministic_hash();
    if head != bundle.provenance_hash {
        return Err(GovernanceError::DigestMismatch {
            expected: bundle.provenance_hash,
            actual: head,
        });
    }

    let queue = ProposalQueue::restore(
        config.max_pending,
        bundle.data.proposals,
        bundle.data.queue_stats,
    );
    info!(
        proposals = bundle.proposal_count,
        records = bundle.provenance_count,
        "imported governance bundle"
    );
    Ok(GovernancePipeline::from_parts(
        config,
        queue,
        chain,
        bundle.data.policies,
        bundle.data.conflicts,
    ))
}

pub fn write_bundle(path: &Path, bundle: &GovernanceBundle) -> Result<()> {
    let json = serde_json::to_string_pretty(bundle)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_bundle(path: &Path) -> Result<GovernanceBundle> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemoryType, ProposalInput};

    fn populated() -> GovernancePipeline {
        let mut p = GovernancePipeline::default();
        p.propose(ProposalInput::new("s", MemoryType::Fact, "k", serde_json::json!(1), 0.9))
            .unwrap();
        p.propose(ProposalInput::new("s", MemoryType::Fact, "k", serde_json::json!(2), 0.9))
            .unwrap();
        p
    }

    #[test]
    fn test_export_import_preserves_state() {
        let p = populated();
        let bundle = p.export_bundle().unwrap();
        assert_eq!(bundle.proposal_count, 2);
        assert_eq!(bundle.conflict_count, 1);

        let restored = import_bundle(GovernanceConfig::default(), bundle).unwrap();
        assert_eq!(restored.chain().deterministic_hash(), p.chain().deterministic_hash());
        assert_eq!(restored.ledger_state_hash().unwrap(), p.ledger_state_hash().unwrap());
        assert_eq!(restored.report().queue_stats, p.report().queue_stats);
        assert_eq!(restored.unresolved_conflicts(), 1);
    }

    #[test]
    fn test_tampered_bundle_rejected() {
        let mut bundle = populated().export_bundle().unwrap();
        bundle.data.proposals[0].subject_key = "tampered".into();
        let err = import_bundle(GovernanceConfig::default(), bundle).unwrap_err();
        assert!(matches!(err, GovernanceError::DigestMismatch { .. }));
    }

    #[test]
    fn test_count_mismatch_rejected_even_with_valid_hash() {
        let mut bundle = populated().export_bundle().unwrap();
        bundle.proposal_count = 7;
        bundle.bundle_hash = bundle.compute_hash().unwrap();
        let err = import_bundle(GovernanceConfig::default(), bundle).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidBundle(_)));
    }

    #[test]
    fn test_write_read_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let bundle = populated().export_bundle().unwrap();
        write_bundle(&path, &bundle).unwrap();
        let read = read_bundle(&path).unwrap();
        assert_eq!(read.bundle_hash, bundle.bundle_hash);
        assert!(import_bundle(GovernanceConfig::default(), read).is_ok());
    }
}
