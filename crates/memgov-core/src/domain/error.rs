//! Domain-level error taxonomy for memgov.
//!
//! Expected governance outcomes (illegal transitions, double decisions,
//! throttling, unauthorized redaction, replay divergence) are returned as
//! outcome data, not as errors. These variants cover malformed input and
//! integrity failures.

use super::proposal::ProposalState;

/// A lifecycle transition outside the allowed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ProposalState,
    pub to: ProposalState,
}

/// memgov domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("invalid proposal input: {0}")]
    InvalidInput(String),

    #[error("payload cannot be canonicalized: {0}")]
    NonCanonicalPayload(String),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    #[error("conflict already resolved: {0}")]
    ConflictAlreadyResolved(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("provenance chain broken at seq {seq}")]
    ChainBroken { seq: u64 },

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for memgov domain operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;
