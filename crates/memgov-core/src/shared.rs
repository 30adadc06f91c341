//! Async handle to one pipeline shared by several producers.
//!
//! Every call takes the same `tokio::sync::Mutex`, so created_seq and
//! provenance seq stay strictly monotonic across tasks.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::GovernanceConfig;
use crate::domain::{MemoryProposal, ProposalInput, Result};
use crate::pipeline::{GovernancePipeline, GovernanceReport, GovernanceResult};
use crate::queue::{DecisionOutcome, QueueAction};

#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<GovernancePipeline>>,
}

impl SharedPipeline {
    pub fn new(config: GovernanceConfig) -> Self {
        Self::from_pipeline(GovernancePipeline::new(config))
    }

    pub fn from_pipeline(pipeline: GovernancePipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub async fn propose(&self, input: ProposalInput) -> Result<GovernanceResult> {
        self.inner.lock().await.propose(input)
    }

    pub async fn act(
        &self,
        proposal_id: &str,
        action: QueueAction,
        actor: &str,
        reason: &str,
    ) -> Result<DecisionOutcome> {
        self.inner.lock().await.act(proposal_id, action, actor, reason)
    }

    pub async fn get(&self, proposal_id: &str) -> Option<MemoryProposal> {
        self.inner.lock().await.get(proposal_id).cloned()
    }

    pub async fn report(&self) -> GovernanceReport {
        self.inner.lock().await.report()
    }

    /// Run `f` with exclusive access to the pipeline.
    pub async fn with<R>(&self, f: impl FnOnce(&mut GovernancePipeline) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }
}
