//! Export/import bundle integrity and provenance slicing over restored state.

use memgov_core::{
    import_bundle, read_bundle, write_bundle, GovernanceConfig, GovernanceError,
    GovernancePipeline, MemoryType, ProposalInput, ProvenanceSlicer, RecordType,
    ResolutionChoice, SharedPipeline,
};
use serde_json::json;

fn busy_pipeline() -> GovernancePipeline {
    let mut p = GovernancePipeline::default();
    let a = p
        .propose(ProposalInput::new("s1", MemoryType::Fact, "user.age", json!(30), 0.9))
        .unwrap();
    let b = p
        .propose(ProposalInput::new("s2", MemoryType::Fact, "user.age", json!(31), 0.9))
        .unwrap();
    p.propose(ProposalInput::new("s1", MemoryType::SessionContext, "topic", json!("x"), 0.8))
        .unwrap();
    p.approve(&a.proposal.proposal_id, "op", "").unwrap();
    p.apply(&a.proposal.proposal_id, "op", "").unwrap();
    p.resolve_conflict(&b.conflicts[0].conflict_id, ResolutionChoice::KeepExisting, "op")
        .unwrap();
    p.reject(&b.proposal.proposal_id, "op", "kept existing").unwrap();
    p
}

#[test]
fn test_bundle_file_round_trip_restores_equivalent_pipeline() {
    let p = busy_pipeline();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.bundle.json");
    write_bundle(&path, &p.export_bundle().unwrap()).unwrap();

    let bundle = read_bundle(&path).unwrap();
    let mut restored = import_bundle(GovernanceConfig::default(), bundle).unwrap();
    assert_eq!(restored.report(), p.report());

    // The restored pipeline keeps sequencing where the original stopped.
    let next = restored
        .propose(ProposalInput::new("s1", MemoryType::Project, "repo", json!("memgov"), 0.9))
        .unwrap();
    let max_seq = p.proposals().map(|x| x.created_seq).max().unwrap();
    assert!(next.proposal.created_seq > max_seq);
    assert!(restored.chain().verify_integrity().is_ok());
}

#[test]
fn test_rehashed_bundle_with_edited_record_fails_chain_check() {
    let mut bundle = busy_pipeline().export_bundle().unwrap();
    bundle.data.provenance[1].decision = "auto_low".into();
    bundle.bundle_hash = bundle.compute_hash().unwrap();

    let err = import_bundle(GovernanceConfig::default(), bundle).unwrap_err();
    assert!(matches!(err, GovernanceError::ChainBroken { seq: 1 }));
}

#[test]
fn test_truncated_provenance_fails_head_check() {
    let mut bundle = busy_pipeline().export_bundle().unwrap();
    bundle.data.provenance.pop();
    bundle.provenance_count -= 1;
    bundle.bundle_hash = bundle.compute_hash().unwrap();

    let err = import_bundle(GovernanceConfig::default(), bundle).unwrap_err();
    assert!(matches!(err, GovernanceError::DigestMismatch { .. }));
}

#[test]
fn test_slices_over_restored_chain_match_original() {
    let p = busy_pipeline();
    let restored = import_bundle(GovernanceConfig::default(), p.export_bundle().unwrap()).unwrap();

    let original = ProvenanceSlicer::new(p.chain());
    let copy = ProvenanceSlicer::new(restored.chain());
    assert_eq!(
        original.slice_by_session("s2").unwrap().slice_hash,
        copy.slice_by_session("s2").unwrap().slice_hash
    );

    let resolved = copy.slice_by_record_type(RecordType::ConflictResolved).unwrap();
    assert_eq!(resolved.len(), 1);
    let lineage = copy.lineage(&resolved.records[0].proposal_id).unwrap();
    let ids: std::collections::BTreeSet<_> =
        lineage.records.iter().map(|r| r.proposal_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_shared_pipeline_from_imported_state() {
    let bundle = busy_pipeline().export_bundle().unwrap();
    let shared = SharedPipeline::from_pipeline(
        import_bundle(GovernanceConfig::default(), bundle).unwrap(),
    );

    let r = shared
        .propose(ProposalInput::new("s3", MemoryType::Fact, "user.age", json!(32), 0.9))
        .await
        .unwrap();
    // Only the applied entry is still live for the subject.
    assert_eq!(r.conflicts.len(), 1);
    assert!(shared.report().await.invariants_hold());
}
