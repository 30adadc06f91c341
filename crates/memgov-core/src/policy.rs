//! Policy classifier: maps a proposal to a risk tier.
//!
//! Classification is a pure function of the proposal's memory type and
//! confidence. Rules are evaluated in fixed priority order:
//!
//! | Priority | Memory types                     | Outcome                                            |
//! |----------|----------------------------------|----------------------------------------------------|
//! | 1        | SESSION_CONTEXT, SYSTEM_STATE    | AUTO_LOW; GUARDED_MEDIUM when confidence < 0.5     |
//! | 2        | PREFERENCE                       | GUARDED_HIGH regardless of confidence              |
//! | 3        | FACT, EPISODE, PROJECT           | GUARDED_MEDIUM at confidence ≥ 0.85, else HIGH     |

use serde::{Deserialize, Serialize};

use crate::domain::{MemoryProposal, MemoryType, RiskTier};

pub const REASON_EPHEMERAL_AUTO: &str = "ephemeral_auto";
pub const REASON_EPHEMERAL_ELEVATED: &str = "ephemeral_low_confidence_elevated";
pub const REASON_PREFERENCE_GUARDED: &str = "preference_always_guarded";
pub const REASON_DURABLE_HIGH_CONFIDENCE: &str = "durable_high_confidence";
pub const REASON_DURABLE_LOW_CONFIDENCE: &str = "durable_low_confidence";

/// Who must sign off on a guarded proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    None,
    Operator,
    Owner,
}

impl ApprovalScope {
    pub fn for_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::AutoLow => Self::None,
            RiskTier::GuardedMedium => Self::Operator,
            RiskTier::GuardedHigh => Self::Owner,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Operator => "operator",
            Self::Owner => "owner",
        }
    }
}

/// The classifier's verdict, attached exactly once per proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub tier: RiskTier,
    pub requires_approval: bool,
    pub reason_code: String,
    pub approval_scope: ApprovalScope,
    /// The confidence value the rule was evaluated against.
    pub confidence_factor: f64,
}

impl PolicyDecision {
    fn new(tier: RiskTier, reason_code: &str, confidence: f64) -> Self {
        Self {
            tier,
            requires_approval: tier.requires_approval(),
            reason_code: reason_code.to_string(),
            approval_scope: ApprovalScope::for_tier(tier),
            confidence_factor: confidence,
        }
    }
}

/// Confidence thresholds used by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    /// Ephemeral types below this confidence are elevated to GUARDED_MEDIUM.
    pub elevation_confidence: f64,
    /// Durable types at or above this confidence are GUARDED_MEDIUM.
    pub durable_medium_confidence: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            elevation_confidence: 0.5,
            durable_medium_confidence: 0.85,
        }
    }
}

/// Deterministic rule-based classifier. No clock, no randomness.
#[derive(Debug, Clone, Default)]
pub struct PolicyClassifier {
    thresholds: PolicyThresholds,
}

impl PolicyClassifier {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> PolicyThresholds {
        self.thresholds
    }

    pub fn classify(&self, proposal: &MemoryProposal) -> PolicyDecision {
        let confidence = proposal.confidence;
        match proposal.memory_type {
            MemoryType::SessionContext | MemoryType::SystemState => {
                if confidence < self.thresholds.elevation_confidence {
                    PolicyDecision::new(
                        RiskTier::GuardedMedium,
                        REASON_EPHEMERAL_ELEVATED,
                        confidence,
                    )
                } else {
                    PolicyDecision::new(RiskTier::AutoLow, REASON_EPHEMERAL_AUTO, confidence)
                }
            }
            // Type-specific rule wins over the general confidence elevation.
            MemoryType::Preference => {
                PolicyDecision::new(RiskTier::GuardedHigh, REASON_PREFERENCE_GUARDED, confidence)
            }
            MemoryType::Fact | MemoryType::Episode | MemoryType::Project => {
                if confidence >= self.thresholds.durable_medium_confidence {
                    PolicyDecision::new(
                        RiskTier::GuardedMedium,
                        REASON_DURABLE_HIGH_CONFIDENCE,
                        confidence,
                    )
                } else {
                    PolicyDecision::new(
                        RiskTier::GuardedHigh,
                        REASON_DURABLE_LOW_CONFIDENCE,
                        confidence,
                    )
                }
            }
        }
    }
}
