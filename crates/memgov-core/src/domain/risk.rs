//! Risk tiers for proposal approval routing.

use serde::{Deserialize, Serialize};

/// Risk tier assigned to a proposal by the policy classifier.
///
/// Guarded tiers require an explicit operator decision before the proposal
/// can take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Auto-approved by policy; logged only.
    AutoLow,
    /// Operator approval required.
    GuardedMedium,
    /// Owner-level approval required.
    GuardedHigh,
}

impl RiskTier {
    /// Whether this tier requires an explicit approval decision.
    pub fn requires_approval(self) -> bool {
        !matches!(self, Self::AutoLow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoLow => "auto_low",
            Self::GuardedMedium => "guarded_medium",
            Self::GuardedHigh => "guarded_high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_tier_ordering() {
        assert!(RiskTier::AutoLow < RiskTier::GuardedMedium);
        assert!(RiskTier::GuardedMedium < RiskTier::GuardedHigh);
    }

    #[test]
    fn test_requires_approval() {
        assert!(!RiskTier::AutoLow.requires_approval());
        assert!(RiskTier::GuardedMedium.requires_approval());
        assert!(RiskTier::GuardedHigh.requires_approval());
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&RiskTier::GuardedMedium).unwrap();
        assert_eq!(json, "\"guarded_medium\"");
        assert_eq!(RiskTier::GuardedMedium.to_string(), "guarded_medium");
    }
}
