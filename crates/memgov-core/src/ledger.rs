//! Ledger editing on top of the governance pipeline.
//!
//! The editor tracks the latest APPLIED proposal per subject key and turns
//! create/update/merge/redact requests into ordinary proposals and lifecycle
//! actions. There is no direct-mutation path: every edit goes through
//! `propose`, `apply` or `retract` and is recorded in provenance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{GovernanceError, ProposalInput, ProposalState, Result};
use crate::pipeline::{GovernancePipeline, GovernanceResult};
use crate::queue::DecisionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Create,
    Update,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    /// Waiting on `commit` or `reject`.
    Pending,
    Applied,
    Rejected,
    /// The queue was at capacity; nothing was stored.
    Throttled,
    /// The proposal left the pending state some other way (e.g. expired).
    Abandoned,
}

/// A create/update/merge request and where it stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEdit {
    pub proposal_id: String,
    pub kind: EditKind,
    pub subject_key: String,
    /// Latest applied entry for the subject when the update was made.
    pub prior_proposal_id: Option<String>,
    /// Entries folded into this one by a merge.
    pub merged_from: Vec<String>,
    pub status: EditStatus,
}

pub struct LedgerEditor {
    pipeline: GovernancePipeline,
    latest: BTreeMap<String, String>,
    edits: BTreeMap<String, LedgerEdit>,
}

impl LedgerEditor {
    pub fn new(pipeline: GovernancePipeline) -> Self {
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        let mut applied: Vec<_> = pipeline
            .proposals()
            .filter(|p| p.state == ProposalState::Applied)
            .collect();
        applied.sort_by_key(|p| p.created_seq);
        for p in applied {
            latest.insert(p.subject_key.clone(), p.proposal_id.clone());
        }
        Self {
            pipeline,
            latest,
            edits: BTreeMap::new(),
        }
    }

    pub fn pipeline(&self) -> &GovernancePipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut GovernancePipeline {
        &mut self.pipeline
    }

    pub fn into_pipeline(self) -> GovernancePipeline {
        self.pipeline
    }

    /// Latest applied proposal id for `subject_key`.
    pub fn latest(&self, subject_key: &str) -> Option<&str> {
        self.latest.get(subject_key).map(String::as_str)
    }

    pub fn edit(&self, proposal_id: &str) -> Option<&LedgerEdit> {
        self.edits.get(proposal_id)
    }

    pub fn create_entry(&mut self, input: ProposalInput, actor: &str) -> Result<LedgerEdit> {
        self.submit(input, EditKind::Create, None, Vec::new(), actor)
    }

    /// Propose a new value for a subject, referencing its current entry.
    pub fn update_entry(&mut self, input: ProposalInput, actor: &str) -> Result<LedgerEdit> {
        let prior = self.latest.get(&input.subject_key).cloned();
        let input = match &prior {
            Some(id) => input.superseding(id.clone()),
            None => input,
        };
        self.submit(input, EditKind::Update, prior, Vec::new(), actor)
    }

    /// Fold `sources` into one new entry. Sources are retracted once it applies.
    pub fn merge_entries(
        &mut self,
        sources: &[String],
        input: ProposalInput,
        actor: &str,
    ) -> Result<LedgerEdit> {
        if sources.is_empty() {
            return Err(GovernanceError::InvalidInput(
                "merge requires at least one source entry".into(),
            ));
        }
        for id in sources {
            if self.pipeline.get(id).is_none() {
                return Err(GovernanceError::ProposalNotFound(id.clone()));
            }
        }
        self.submit(input, EditKind::Merge, None, sources.to_vec(), actor)
    }

    /// Retract an applied entry with an auditable `redacted:<reason>` code.
    pub fn redact_entry(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        let outcome = self
            .pipeline
            .retract(proposal_id, actor, &format!("redacted:{reason}"))?;
        if outcome.is_ok() {
            self.latest.retain(|_, id| id != proposal_id);
        }
        Ok(outcome)
    }

    /// Approve a pending edit if needed, then apply and finalize it.
    pub fn commit(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        let Some(edit) = self.edits.get(proposal_id).cloned() else {
            return Err(GovernanceError::ProposalNotFound(proposal_id.to_string()));
        };
        let state = self.pipeline.get(proposal_id).map(|p| p.state);
        if state == Some(ProposalState::PendingApproval) {
            let approved = self.pipeline.approve(proposal_id, actor, reason)?;
            if !approved.is_ok() {
                return Ok(approved);
            }
        }
        let applied = self.pipeline.apply(proposal_id, actor, reason)?;
        if applied.is_ok() {
            self.finalize(&edit, actor)?;
        } else {
            self.refresh_status(proposal_id);
        }
        Ok(applied)
    }

    pub fn reject(
        &mut self,
        proposal_id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        let outcome = self.pipeline.reject(proposal_id, actor, reason)?;
        self.refresh_status(proposal_id);
        Ok(outcome)
    }

    fn submit(
        &mut self,
        input: ProposalInput,
        kind: EditKind,
        prior_proposal_id: Option<String>,
        merged_from: Vec<String>,
        actor: &str,
    ) -> Result<LedgerEdit> {
        let result = self.pipeline.propose(input)?;
        let proposal_id = result.proposal.proposal_id.clone();
        if result.duplicate {
            if let Some(existing) = self.edits.get(&proposal_id) {
                return Ok(existing.clone());
            }
        }

        let mut edit = LedgerEdit {
            proposal_id: proposal_id.clone(),
            kind,
            subject_key: result.proposal.subject_key.clone(),
            prior_proposal_id,
            merged_from,
            status: status_of(&result),
        };
        if result.throttled {
            return Ok(edit);
        }
        self.edits.insert(proposal_id.clone(), edit.clone());

        if result.auto_approved {
            debug!(proposal_id = %proposal_id, "applying auto-approved edit");
            let applied = self.pipeline.apply(&proposal_id, actor, "auto_approved_edit")?;
            if applied.is_ok() {
                self.finalize(&edit, actor)?;
                edit.status = EditStatus::Applied;
            }
        }
        Ok(edit)
    }

    fn finalize(&mut self, edit: &LedgerEdit, actor: &str) -> Result<()> {
        if let Some(prior) = &edit.prior_proposal_id {
            if self.is_applied(prior) {
                self.pipeline
                    .retract(prior, actor, &format!("superseded_by:{}", edit.proposal_id))?;
            }
        }
        for source in &edit.merged_from {
            if self.is_applied(source) {
                self.pipeline
                    .retract(source, actor, &format!("merged_into:{}", edit.proposal_id))?;
            }
            self.latest.retain(|_, id| id != source);
        }
        self.latest
            .insert(edit.subject_key.clone(), edit.proposal_id.clone());
        if let Some(stored) = self.edits.get_mut(&edit.proposal_id) {
            stored.status = EditStatus::Applied;
        }
        Ok(())
    }

    fn is_applied(&self, proposal_id: &str) -> bool {
        self.pipeline
            .get(proposal_id)
            .is_some_and(|p| p.state == ProposalState::Applied)
    }

    fn refresh_status(&mut self, proposal_id: &str) {
        let state = self.pipeline.get(proposal_id).map(|p| p.state);
        if let Some(edit) = self.edits.get_mut(proposal_id) {
            edit.status = match state {
                Some(
                    ProposalState::Proposed
                    | ProposalState::PendingApproval
                    | ProposalState::Approved,
                ) => EditStatus::Pending,
                Some(ProposalState::Applied) => EditStatus::Applied,
                Some(ProposalState::Rejected) => EditStatus::Rejected,
                _ => EditStatus::Abandoned,
            };
        }
    }
}

fn status_of(result: &GovernanceResult) -> EditStatus {
    if result.throttled {
        return EditStatus::Throttled;
    }
    match result.proposal.state {
        ProposalState::Applied => EditStatus::Applied,
        ProposalState::Rejected => EditStatus::Rejected,
        ProposalState::Proposed | ProposalState::PendingApproval | ProposalState::Approved => {
            EditStatus::Pending
        }
        _ => EditStatus::Abandoned,
    }
}
