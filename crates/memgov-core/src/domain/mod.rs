//! Domain models for memgov.
//!
//! Canonical definitions for the core entities:
//! - `MemoryProposal`: a candidate memory mutation with content-addressed identity
//! - `ProposalState`: the lifecycle state machine
//! - `RiskTier`: approval routing produced by the policy classifier

pub mod digest;
pub mod error;
pub mod proposal;
pub mod risk;

pub use error::{GovernanceError, Result, TransitionError};
pub use proposal::{
    derive_proposal_id, payload_hash, MemoryProposal, MemoryType, ProposalInput, ProposalState,
};
pub use risk::RiskTier;
