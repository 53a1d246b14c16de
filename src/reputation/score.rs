//! Reputation deltas and thresholds

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ReputationConfig;
use crate::models::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationPolicy {
    pub up_reward: i64,
    pub down_penalty: i64,
    pub active_threshold: i64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self::from(&ReputationConfig::default())
    }
}

impl From<&ReputationConfig> for ReputationPolicy {
    fn from(config: &ReputationConfig) -> Self {
        Self {
            up_reward: config.up_reward,
            down_penalty: config.down_penalty,
            active_threshold: config.active_threshold,
        }
    }
}

impl ReputationPolicy {
    pub fn delta_for(&self, up: bool) -> i64 {
        if up {
            self.up_reward
        } else {
            self.down_penalty
        }
    }

    /// Pre-sum the deltas of a batch per identity
    pub fn deltas_for(&self, observations: &[Observation]) -> HashMap<String, i64> {
        let mut deltas: HashMap<String, i64> = HashMap::new();
        for observation in observations {
            *deltas.entry(observation.identity.clone()).or_default() += self.delta_for(observation.up);
        }
        deltas
    }

    pub fn is_active(&self, reputation: i64) -> bool {
        reputation >= self.active_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IpVersion;

    #[test]
    fn test_defaults() {
        let policy = ReputationPolicy::default();
        assert_eq!(policy.delta_for(true), 1);
        assert_eq!(policy.delta_for(false), -2);
        assert!(policy.is_active(100));
        assert!(!policy.is_active(99));
    }

    #[test]
    fn test_deltas_are_summed_per_identity() {
        let policy = ReputationPolicy::default();
        let observations = vec![
            Observation::new("key1", IpVersion::V4, false, 1),
            Observation::new("key1", IpVersion::V6, false, 1),
            Observation::new("key2", IpVersion::V4, true, 1),
            Observation::new("key2", IpVersion::V6, false, 1),
        ];

        let deltas = policy.deltas_for(&observations);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas["key1"], -4);
        assert_eq!(deltas["key2"], -1);
    }
}
