//! Tombstoned, irreversible payload redaction.
//!
//! Protected memory types need an authorization token. A refused attempt is
//! counted, logged and recorded as `redaction_unauthorized`; nothing is
//! scrubbed. A tombstone carries only hashes of what was removed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GovernanceConfig;
use crate::domain::digest::compute_digest;
use crate::domain::{MemoryType, ProposalState, Result};
use crate::ledger::LedgerEditor;
use crate::metrics::METRICS;
use crate::obs;
use crate::queue::DecisionOutcome;

/// Which memory types need an authorization token to redact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionPolicy {
    pub protected_types: Vec<MemoryType>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            protected_types: vec![MemoryType::Preference, MemoryType::Fact],
        }
    }
}

impl RedactionPolicy {
    pub fn is_protected(&self, memory_type: MemoryType) -> bool {
        self.protected_types.contains(&memory_type)
    }
}

/// Proof that a payload existed and was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub tombstone_id: String,
    pub proposal_id: String,
    pub subject_key: String,
    pub memory_type: MemoryType,
    pub payload_hash: String,
    pub reason: String,
    pub actor: String,
    pub redacted_at: DateTime<Utc>,
    /// Hash over proposal_id, subject_key, memory_type, payload_hash, reason and actor.
    pub tombstone_hash: String,
}

impl Tombstone {
    fn compute_hash(
        proposal_id: &str,
        subject_key: &str,
        memory_type: MemoryType,
        payload_hash: &str,
        reason: &str,
        actor: &str,
    ) -> Result<String> {
        compute_digest(&serde_json::json!({
            "proposal_id": proposal_id,
            "subject_key": subject_key,
            "memory_type": memory_type.as_str(),
            "payload_hash": payload_hash,
            "reason": reason,
            "actor": actor,
        }))
    }

    /// Recompute the hash from the stored fields.
    pub fn verify(&self) -> Result<bool> {
        let expected = Self::compute_hash(
            &self.proposal_id,
            &self.subject_key,
            self.memory_type,
            &self.payload_hash,
            &self.reason,
            &self.actor,
        )?;
        Ok(expected == self.tombstone_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RedactionOutcome {
    Redacted { tombstone: Tombstone },
    Unauthorized {
        proposal_id: String,
        memory_type: MemoryType,
    },
    NotFound { proposal_id: String },
    AlreadyRedacted {
        proposal_id: String,
        tombstone_id: String,
    },
    /// The entry is in a state that cannot be retracted (e.g. still pending).
    Refused {
        proposal_id: String,
        reason: String,
        current_state: Option<ProposalState>,
    },
}

impl RedactionOutcome {
    pub fn is_redacted(&self) -> bool {
        matches!(self, Self::Redacted { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RedactionEngine {
    policy: RedactionPolicy,
    tombstones: BTreeMap<String, Tombstone>,
    unauthorized_attempts: u64,
}

impl RedactionEngine {
    pub fn new(policy: RedactionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Engine using the configured `redaction` policy.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(config.redaction.clone())
    }

    /// Retract (if still applied) and scrub `proposal_id`.
    pub fn redact(
        &mut self,
        editor: &mut LedgerEditor,
        proposal_id: &str,
        actor: &str,
        reason: &str,
        authorization: Option<&str>,
    ) -> Result<RedactionOutcome> {
        let Some(proposal) = editor.pipeline().get(proposal_id).cloned() else {
            return Ok(RedactionOutcome::NotFound {
                proposal_id: proposal_id.to_string(),
            });
        };
        if let Some(existing) = self.tombstones.get(proposal_id) {
            return Ok(RedactionOutcome::AlreadyRedacted {
                proposal_id: proposal_id.to_string(),
                tombstone_id: existing.tombstone_id.clone(),
            });
        }

        let authorized = authorization.is_some_and(|t| !t.trim().is_empty());
        if self.policy.is_protected(proposal.memory_type) && !authorized {
            self.unauthorized_attempts += 1;
            obs::emit_redaction_refused(
                &proposal.subject_key,
                proposal.memory_type.as_str(),
                actor,
            );
            editor
                .pipeline_mut()
                .record_unauthorized_redaction(proposal_id, actor)?;
            return Ok(RedactionOutcome::Unauthorized {
                proposal_id: proposal_id.to_string(),
                memory_type: proposal.memory_type,
            });
        }

        match proposal.state {
            ProposalState::Applied => {
                let retracted = editor.redact_entry(proposal_id, actor, reason)?;
                if let DecisionOutcome::Error {
                    reason,
                    current_state,
                    ..
                } = retracted
                {
                    return Ok(RedactionOutcome::Refused {
                        proposal_id: proposal_id.to_string(),
                        reason,
                        current_state,
                    });
                }
            }
            ProposalState::Retracted => {}
            other => {
                return Ok(RedactionOutcome::Refused {
                    proposal_id: proposal_id.to_string(),
                    reason: "not_retractable".to_string(),
                    current_state: Some(other),
                });
            }
        }

        let tombstone_hash = Tombstone::compute_hash(
            &proposal.proposal_id,
            &proposal.subject_key,
            proposal.memory_type,
            &proposal.payload_hash,
            reason,
            actor,
        )?;
        let scrubbed = editor
            .pipeline_mut()
            .redact_payload(proposal_id, actor, &tombstone_hash)?;
        if let DecisionOutcome::Error {
            reason,
            current_state,
            ..
        } = scrubbed
        {
            return Ok(RedactionOutcome::Refused {
                proposal_id: proposal_id.to_string(),
                reason,
                current_state,
            });
        }

        let tombstone = Tombstone {
            tombstone_id: Uuid::new_v4().to_string(),
            proposal_id: proposal.proposal_id,
            subject_key: proposal.subject_key,
            memory_type: proposal.memory_type,
            payload_hash: proposal.payload_hash,
            reason: reason.to_string(),
            actor: actor.to_string(),
            redacted_at: Utc::now(),
            tombstone_hash,
        };
        METRICS.inc_redactions();
        obs::emit_redaction_tombstoned(&tombstone.proposal_id, &tombstone.tombstone_hash);
        self.tombstones
            .insert(tombstone.proposal_id.clone(), tombstone.clone());
        Ok(RedactionOutcome::Redacted { tombstone })
    }

    pub fn tombstone(&self, proposal_id: &str) -> Option<&Tombstone> {
        self.tombstones.get(proposal_id)
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Tombstone> {
        self.tombstones.values()
    }

    pub fn unauthorized_attempts(&self) -> u64 {
        self.unauthorized_attempts
    }

    pub fn policy(&self) -> &RedactionPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProposalInput;
    use crate::pipeline::{redaction_marker, GovernancePipeline};
    use crate::provenance::{DetailValue, RecordType};

    fn applied(
        ed: &mut LedgerEditor,
        memory_type: MemoryType,
        key: &str,
        value: serde_json::Value,
    ) -> String {
        let edit = ed
            .create_entry(ProposalInput::new("s", memory_type, key, value, 0.9), "agent")
            .unwrap();
        ed.commit(&edit.proposal_id, "op", "ok").unwrap();
        edit.proposal_id
    }

    #[test]
    fn test_protected_type_requires_token() {
        let mut ed = LedgerEditor::new(GovernancePipeline::default());
        let id = applied(&mut ed, MemoryType::Preference, "theme", serde_json::json!("dark"));
        let mut engine = RedactionEngine::default();

        let out = engine.redact(&mut ed, &id, "op", "gdpr", None).unwrap();
        assert!(matches!(out, RedactionOutcome::Unauthorized { .. }));
        assert_eq!(engine.unauthorized_attempts(), 1);
        assert_eq!(ed.pipeline().get(&id).unwrap().state, ProposalState::Applied);
        assert_eq!(
            ed.pipeline().chain().records().last().unwrap().record_type,
            RecordType::RedactionUnauthorized
        );
    }

    #[test]
    fn test_tombstone_holds_hashes_only() {
        let mut ed = LedgerEditor::new(GovernancePipeline::default());
        let secret = serde_json::json!({"ssn": "123-45-6789"});
        let id = applied(&mut ed, MemoryType::Fact, "user.ssn", secret.clone());
        let mut engine = RedactionEngine::default();

        let out = engine
            .redact(&mut ed, &id, "op", "user_request", Some("token-1"))
            .unwrap();
        let RedactionOutcome::Redacted { tombstone } = out else {
            panic!("expected redaction, got {out:?}");
        };
        assert!(tombstone.verify().unwrap());
        let serialized = serde_json::to_string(&tombstone).unwrap();
        assert!(!serialized.contains("123-45-6789"));

        let stored = ed.pipeline().get(&id).unwrap();
        assert_eq!(stored.state, ProposalState::Retracted);
        assert_eq!(stored.payload, redaction_marker());

        let last = ed.pipeline().chain().records().last().unwrap();
        assert_eq!(last.record_type, RecordType::PayloadRedacted);
        assert_eq!(
            last.details.get("tombstone_hash"),
            Some(&DetailValue::Text(tombstone.tombstone_hash.clone()))
        );

        let again = engine
            .redact(&mut ed, &id, "op", "user_request", Some("token-1"))
            .unwrap();
        assert!(matches!(again, RedactionOutcome::AlreadyRedacted { .. }));
    }

    #[test]
    fn test_unprotected_and_missing() {
        let mut ed = LedgerEditor::new(GovernancePipeline::default());
        let id = applied(&mut ed, MemoryType::SessionContext, "turn", serde_json::json!(1));
        let mut engine = RedactionEngine::default();
        assert!(engine.redact(&mut ed, &id, "op", "cleanup", None).unwrap().is_redacted());
        assert!(matches!(
            engine.redact(&mut ed, "nope", "op", "cleanup", None).unwrap(),
            RedactionOutcome::NotFound { .. }
        ));
    }

    #[test]
    fn test_pending_entry_is_refused() {
        let mut ed = LedgerEditor::new(GovernancePipeline::default());
        let input = ProposalInput::new("s", MemoryType::Episode, "e", serde_json::json!(1), 0.9);
        let edit = ed.create_entry(input, "agent").unwrap();
        let mut engine = RedactionEngine::default();
        let out = engine.redact(&mut ed, &edit.proposal_id, "op", "x", None).unwrap();
        assert!(matches!(out, RedactionOutcome::Refused { .. }));
    }
    #[test]
    fn test_engine_follows_configured_policy() {
        let mut config = GovernanceConfig::default();
        config.redaction.protected_types = vec![MemoryType::Preference];
        let engine = RedactionEngine::from_config(&config);
        assert!(!engine.policy().is_protected(MemoryType::Fact));
        assert!(engine.policy().is_protected(MemoryType::Preference));
    }
}
