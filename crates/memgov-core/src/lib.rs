//! memgov Core Library
//!
//! Governs every write to durable agent memory: proposals are classified,
//! checked for conflicts, queued for approval when needed and recorded in a
//! hash-chained provenance log that replays byte-for-byte.

pub mod bundle;
pub mod config;
pub mod conflict;
pub mod domain;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod policy;
pub mod provenance;
pub mod queue;
pub mod redaction;
pub mod replay;
pub mod shared;
pub mod slicer;
pub mod telemetry;

pub use domain::{
    derive_proposal_id, payload_hash, GovernanceError, MemoryProposal, MemoryType, ProposalInput,
    ProposalState, Result, RiskTier, TransitionError,
};

pub use bundle::{import_bundle, read_bundle, write_bundle, BundleData, GovernanceBundle};
pub use config::GovernanceConfig;
pub use conflict::{
    ConflictDetector, ConflictRecord, ConflictSeverity, ConflictStats, ConflictType,
    ResolutionChoice,
};
pub use ledger::{EditKind, EditStatus, LedgerEdit, LedgerEditor};
pub use pipeline::{GovernancePipeline, GovernanceReport, GovernanceResult};
pub use policy::{ApprovalScope, PolicyClassifier, PolicyDecision, PolicyThresholds};
pub use provenance::{
    DetailValue, Details, GovernanceRecord, ProvenanceChain, ProvenanceStats, RecordType,
    GENESIS_HASH,
};
pub use queue::{DecisionOutcome, ProposalQueue, QueueAction, QueueStats, SubmitOutcome};
pub use redaction::{RedactionEngine, RedactionOutcome, RedactionPolicy, Tombstone};
pub use replay::{
    RejectedInput, ReplayAction, ReplayDecision, ReplayEngine, ReplayExpectation, ReplayReport,
    ReplayStream, ReplayVerification,
};
pub use shared::SharedPipeline;
pub use slicer::{ProvenanceSlice, ProvenanceSlicer};

pub use metrics::METRICS;
pub use obs::PipelineSpan;
pub use telemetry::init_tracing;

/// memgov version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
