//! Conflict detection between an incoming proposal and registered ones.
//!
//! Conflicts are surfaced, never auto-resolved. The only mutator of a
//! conflict's resolution is [`ConflictDetector::resolve`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::digest::compute_digest;
use crate::domain::{GovernanceError, MemoryProposal, MemoryType, ProposalState, Result, RiskTier};

/// Kind of relationship between two proposals.
///
/// Declaration order is the tie-break order within one proposal pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Same subject and type, different payload.
    KeyCollision,
    /// Same subject, different memory type.
    TypeConflict,
    /// Identical content submitted close together (likely duplicate).
    RecencyConflict,
    /// Same subject and type, different schema version.
    SchemaConflict,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyCollision => "key_collision",
            Self::TypeConflict => "type_conflict",
            Self::RecencyConflict => "recency_conflict",
            Self::SchemaConflict => "schema_conflict",
        }
    }

    pub fn severity(self) -> ConflictSeverity {
        match self {
            Self::KeyCollision => ConflictSeverity::High,
            Self::TypeConflict | Self::SchemaConflict => ConflictSeverity::Medium,
            Self::RecencyConflict => ConflictSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Operator's explicit choice for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    Supersede,
    KeepExisting,
    Coexist,
    Reject,
}

impl ResolutionChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supersede => "supersede",
            Self::KeepExisting => "keep_existing",
            Self::Coexist => "coexist",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub choice: ResolutionChoice,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub conflict_id: String,
    pub existing_proposal_id: String,
    pub incoming_proposal_id: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub subject_key: String,
    /// Final risk tier of the incoming proposal.
    pub incoming_risk_tier: RiskTier,
    pub resolution: Option<ConflictResolution>,
}

impl ConflictRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Order-independent conflict identity: hash of the sorted id pair and type.
pub fn conflict_id(a: &str, b: &str, conflict_type: ConflictType) -> Result<String> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    compute_digest(&serde_json::json!({
        "proposal_ids": [lo, hi],
        "conflict_type": conflict_type.as_str(),
    }))
}

/// The fields conflict rules look at, plus the state used to skip terminal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ScanEntry {
    proposal_id: String,
    memory_type: MemoryType,
    subject_key: String,
    payload_hash: String,
    schema_version: u32,
    created_seq: u64,
    state: ProposalState,
}

impl From<&MemoryProposal> for ScanEntry {
    fn from(p: &MemoryProposal) -> Self {
        Self {
            proposal_id: p.proposal_id.clone(),
            memory_type: p.memory_type,
            subject_key: p.subject_key.clone(),
            payload_hash: p.payload_hash.clone(),
            schema_version: p.schema_version,
            created_seq: p.created_seq,
            state: p.state,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStats {
    pub total: u64,
    pub unresolved: u64,
    pub by_type: BTreeMap<String, u64>,
}

/// Scan set of registered proposals plus the registry of detected conflicts.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    recency_window: u64,
    scan_set: BTreeMap<String, ScanEntry>,
    conflicts: BTreeMap<String, ConflictRecord>,
}

impl ConflictDetector {
    pub fn new(recency_window: u64) -> Self {
        Self {
            recency_window,
            ..Default::default()
        }
    }

    /// Add (or refresh) a proposal in the scan set.
    pub fn register(&mut self, proposal: &MemoryProposal) {
        self.scan_set
            .insert(proposal.proposal_id.clone(), ScanEntry::from(proposal));
    }

    /// Track a lifecycle change; terminal proposals drop out of scans.
    pub fn update_state(&mut self, proposal_id: &str, state: ProposalState) {
        if let Some(entry) = self.scan_set.get_mut(proposal_id) {
            entry.state = state;
        }
    }

    /// Check `incoming` against every registered, non-terminal proposal.
    ///
    /// Pure: nothing is stored until [`ConflictDetector::record`] is called.
    pub fn detect(&self, incoming: &MemoryProposal) -> Result<Vec<ConflictRecord>> {
        let mut candidates: Vec<&ScanEntry> = self
            .scan_set
            .values()
            .filter(|e| e.proposal_id != incoming.proposal_id && !e.state.is_terminal())
            .filter(|e| e.subject_key == incoming.subject_key)
            .collect();
        candidates.sort_by(|a, b| {
            (a.created_seq, &a.proposal_id).cmp(&(b.created_seq, &b.proposal_id))
        });

        let mut found = Vec::new();
        for existing in candidates {
            for conflict_type in self.matching_rules(existing, incoming) {
                found.push(ConflictRecord {
                    conflict_id: conflict_id(
                        &existing.proposal_id,
                        &incoming.proposal_id,
                        conflict_type,
                    )?,
                    existing_proposal_id: existing.proposal_id.clone(),
                    incoming_proposal_id: incoming.proposal_id.clone(),
                    conflict_type,
                    severity: conflict_type.severity(),
                    subject_key: incoming.subject_key.clone(),
                    incoming_risk_tier: incoming.risk_tier,
                    resolution: None,
                });
            }
        }
        Ok(found)
    }

    fn matching_rules(&self, existing: &ScanEntry, incoming: &MemoryProposal) -> Vec<ConflictType> {
        let mut types = Vec::new();
        if existing.memory_type != incoming.memory_type {
            types.push(ConflictType::TypeConflict);
            return types;
        }
        if existing.payload_hash != incoming.payload_hash {
            types.push(ConflictType::KeyCollision);
        } else if existing.created_seq.abs_diff(incoming.created_seq) <= self.recency_window {
            types.push(ConflictType::RecencyConflict);
        }
        if existing.schema_version != incoming.schema_version {
            types.push(ConflictType::SchemaConflict);
        }
        types.sort();
        types
    }

    /// Store detected conflicts. Already-known conflict ids are left as they are.
    pub fn record(&mut self, conflicts: &[ConflictRecord]) {
        for c in conflicts {
            self.conflicts
                .entry(c.conflict_id.clone())
                .or_insert_with(|| c.clone());
        }
    }

    pub fn resolve(
        &mut self,
        conflict_id: &str,
        choice: ResolutionChoice,
        actor: &str,
    ) -> Result<ConflictRecord> {
        let record = self
            .conflicts
            .get_mut(conflict_id)
            .ok_or_else(|| GovernanceError::ConflictNotFound(conflict_id.to_string()))?;
        if record.is_resolved() {
            return Err(GovernanceError::ConflictAlreadyResolved(
                conflict_id.to_string(),
            ));
        }
        record.resolution = Some(ConflictResolution {
            choice,
            actor: actor.to_string(),
        });
        Ok(record.clone())
    }

    pub fn get(&self, conflict_id: &str) -> Option<&ConflictRecord> {
        self.conflicts.get(conflict_id)
    }

    /// All stored conflicts, ordered by conflict id.
    pub fn conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.values()
    }

    pub fn unresolved_count(&self) -> u64 {
        self.conflicts.values().filter(|c| !c.is_resolved()).count() as u64
    }

    pub fn stats(&self) -> ConflictStats {
        let mut stats = ConflictStats {
            total: self.conflicts.len() as u64,
            unresolved: self.unresolved_count(),
            by_type: BTreeMap::new(),
        };
        for c in self.conflicts.values() {
            *stats
                .by_type
                .entry(c.conflict_type.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProposalInput;

    fn proposal(
        session: &str,
        memory_type: MemoryType,
        key: &str,
        payload: serde_json::Value,
        seq: u64,
    ) -> MemoryProposal {
        let input = ProposalInput::new(session, memory_type, key, payload, 0.9);
        MemoryProposal::create(input, RiskTier::GuardedMedium, seq).unwrap()
    }

    #[test]
    fn test_key_collision_is_high_and_order_independent() {
        let a = proposal("s", MemoryType::Fact, "user.age", serde_json::json!(30), 0);
        let b = proposal("s", MemoryType::Fact, "user.age", serde_json::json!(31), 1);

        let mut d1 = ConflictDetector::new(8);
        d1.register(&a);
        let forward = d1.detect(&b).unwrap();

        let mut d2 = ConflictDetector::new(8);
        d2.register(&b);
        let backward = d2.detect(&a).unwrap();

        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].conflict_type, ConflictType::KeyCollision);
        assert_eq!(forward[0].severity, ConflictSeverity::High);
        assert_eq!(forward[0].conflict_id, backward[0].conflict_id);
    }

    #[test]
    fn test_type_conflict() {
        let a = proposal("s", MemoryType::Fact, "k", serde_json::json!(1), 0);
        let b = proposal("s", MemoryType::Preference, "k", serde_json::json!(1), 1);
        let mut d = ConflictDetector::new(8);
        d.register(&a);
        let found = d.detect(&b).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictType::TypeConflict);
        assert_eq!(found[0].severity, ConflictSeverity::Medium);
    }

    #[test]
    fn test_recency_conflict_respects_window() {
        // Same content from another session: distinct ids, identical payload.
        let a = proposal("s1", MemoryType::Episode, "k", serde_json::json!("x"), 10);
        let near = proposal("s2", MemoryType::Episode, "k", serde_json::json!("x"), 12);
        let far = proposal("s3", MemoryType::Episode, "k", serde_json::json!("x"), 30);

        let mut d = ConflictDetector::new(2);
        d.register(&a);
        let found = d.detect(&near).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictType::RecencyConflict);
        assert_eq!(found[0].severity, ConflictSeverity::Low);
        assert!(d.detect(&far).unwrap().is_empty());
    }

    #[test]
    fn test_schema_and_key_conflicts_can_coexist() {
        let a = proposal("s", MemoryType::Fact, "k", serde_json::json!(1), 0);
        let input = ProposalInput::new("s", MemoryType::Fact, "k", serde_json::json!(2), 0.9)
            .with_schema_version(2);
        let b = MemoryProposal::create(input, RiskTier::GuardedMedium, 1).unwrap();
        let mut d = ConflictDetector::new(8);
        d.register(&a);
        let types: Vec<_> = d.detect(&b).unwrap().iter().map(|c| c.conflict_type).collect();
        assert_eq!(
            types,
            vec![ConflictType::KeyCollision, ConflictType::SchemaConflict]
        );
    }

    #[test]
    fn test_terminal_proposals_are_skipped() {
        let a = proposal("s", MemoryType::Fact, "k", serde_json::json!(1), 0);
        let b = proposal("s", MemoryType::Fact, "k", serde_json::json!(2), 1);
        let mut d = ConflictDetector::new(8);
        d.register(&a);
        d.update_state(&a.proposal_id, ProposalState::Rejected);
        assert!(d.detect(&b).unwrap().is_empty());

        // APPLIED is not terminal.
        d.update_state(&a.proposal_id, ProposalState::Applied);
        assert_eq!(d.detect(&b).unwrap().len(), 1);
    }

    #[test]
    fn test_output_ordered_by_created_seq() {
        let older = proposal("s1", MemoryType::Fact, "k", serde_json::json!(1), 5);
        let newer = proposal("s2", MemoryType::Fact, "k", serde_json::json!(2), 2);
        let incoming = proposal("s3", MemoryType::Fact, "k", serde_json::json!(3), 9);
        let mut d = ConflictDetector::new(0);
        d.register(&older);
        d.register(&newer);
        let found = d.detect(&incoming).unwrap();
        assert_eq!(found[0].existing_proposal_id, newer.proposal_id);
        assert_eq!(found[1].existing_proposal_id, older.proposal_id);
    }

    #[test]
    fn test_resolve_is_explicit_and_one_shot() {
        let a = proposal("s", MemoryType::Fact, "k", serde_json::json!(1), 0);
        let b = proposal("s", MemoryType::Fact, "k", serde_json::json!(2), 1);
        let mut d = ConflictDetector::new(8);
        d.register(&a);
        let found = d.detect(&b).unwrap();
        d.record(&found);
        assert_eq!(d.unresolved_count(), 1);

        let id = found[0].conflict_id.clone();
        let resolved = d.resolve(&id, ResolutionChoice::Supersede, "operator").unwrap();
        assert_eq!(resolved.resolution.unwrap().choice, ResolutionChoice::Supersede);
        assert_eq!(d.unresolved_count(), 0);

        assert!(matches!(
            d.resolve(&id, ResolutionChoice::Coexist, "operator"),
            Err(GovernanceError::ConflictAlreadyResolved(_))
        ));
        assert!(matches!(
            d.resolve("nope", ResolutionChoice::Coexist, "operator"),
            Err(GovernanceError::ConflictNotFound(_))
        ));
        assert_eq!(d.stats().by_type.get("key_collision"), Some(&1));
    }
}
