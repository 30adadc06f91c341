//! Governance configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{GovernanceError, Result};
use crate::policy::PolicyThresholds;
use crate::redaction::RedactionPolicy;

/// Configuration for one governance pipeline instance.
///
/// Replay must run with the same configuration as the stream it replays,
/// otherwise throttling and classification can legitimately diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Maximum number of proposals waiting on an operator decision.
    pub max_pending: usize,
    /// created_seq distance under which identical submissions are flagged.
    pub recency_window: u64,
    pub policy: PolicyThresholds,
    pub redaction: RedactionPolicy,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        GovernanceConfig {
            max_pending: 128,
            recency_window: 8,
            policy: PolicyThresholds::default(),
            redaction: RedactionPolicy::default(),
        }
    }
}

impl GovernanceConfig {
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_recency_window(mut self, window: u64) -> Self {
        self.recency_window = window;
        self
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: GovernanceConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pending == 0 {
            return Err(GovernanceError::Config(
                "max_pending must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("policy.elevation_confidence", self.policy.elevation_confidence),
            (
                "policy.durable_medium_confidence",
                self.policy.durable_medium_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GovernanceError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemoryType;

    #[test]
    fn test_config_default() {
        let config = GovernanceConfig::default();
        assert_eq!(config.max_pending, 128);
        assert_eq!(config.recency_window, 8);
        assert_eq!(config.policy.elevation_confidence, 0.5);
        assert_eq!(config.policy.durable_medium_confidence, 0.85);
        assert_eq!(
            config.redaction.protected_types,
            vec![MemoryType::Preference, MemoryType::Fact]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity_and_bad_thresholds() {
        assert!(GovernanceConfig::default().with_max_pending(0).validate().is_err());

        let mut config = GovernanceConfig::default();
        config.policy.durable_medium_confidence = 1.2;
        assert!(matches!(config.validate(), Err(GovernanceError::Config(_))));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memgov.json");
        std::fs::write(&path, r#"{ "max_pending": 3 }"#).unwrap();

        let config = GovernanceConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_pending, 3);
        assert_eq!(config.recency_window, 8);
    }
}
