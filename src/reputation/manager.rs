//! Reputation Manager - applies observation deltas through the store

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::database::StatusStore;
use crate::models::Observation;
use crate::reputation::ReputationPolicy;

pub struct ReputationManager {
    store: Arc<dyn StatusStore>,
    policy: ReputationPolicy,
}

impl ReputationManager {
    pub fn new(store: Arc<dyn StatusStore>, policy: ReputationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ReputationPolicy {
        &self.policy
    }

    /// Apply `delta` to an active node unless it would go below zero.
    ///
    /// Returns whether a node was updated. Storage errors are logged and
    /// reported as `false`.
    pub async fn adjust(&self, identity: &str, delta: i64) -> bool {
        match self.store.adjust_reputation_conditional(identity, delta).await {
            Ok(updated) => {
                debug!(identity = %identity, delta, updated, "Reputation adjusted");
                updated
            }
            Err(e) => {
                error!(identity = %identity, delta, error = %e, "Failed to adjust reputation");
                false
            }
        }
    }

    pub async fn record_observation(&self, observation: &Observation) -> bool {
        self.adjust(&observation.identity, self.policy.delta_for(observation.up))
            .await
    }

    /// Apply pre-summed deltas independently; returns how many were applied
    pub async fn adjust_batch(&self, deltas: &HashMap<String, i64>) -> usize {
        let mut applied = 0;
        for (identity, delta) in deltas {
            if self.adjust(identity, *delta).await {
                applied += 1;
            }
        }
        applied
    }

    pub async fn record_batch(&self, observations: &[Observation]) -> usize {
        let deltas = self.policy.deltas_for(observations);
        self.adjust_batch(&deltas).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::{IpVersion, MixRegistrationInfo, NodeInfo, RegisteredNode};

    async fn store_with_node(identity: &str, reputation: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let node = RegisteredNode::from_mix(
            MixRegistrationInfo {
                node: NodeInfo {
                    mix_host: "10.0.0.1:1789".to_string(),
                    identity_key: identity.to_string(),
                    version: "0.9.2".to_string(),
                    ..Default::default()
                },
                layer: 1,
            },
            1,
        );
        store.upsert_registered_node(&node).await.unwrap();
        store.set_reputation(identity, reputation).await.unwrap();
        store
    }

    async fn reputation(store: &MemoryStore, identity: &str) -> i64 {
        store.resolve_node(identity).await.unwrap().unwrap().1.reputation
    }

    #[tokio::test]
    async fn test_floor_at_zero() {
        let store = store_with_node("key1", 1).await;
        let manager = ReputationManager::new(store.clone(), ReputationPolicy::default());

        let down = Observation::new("key1", IpVersion::V4, false, 1);
        assert!(!manager.record_observation(&down).await);
        assert_eq!(reputation(&store, "key1").await, 1);

        let up = Observation::new("key1", IpVersion::V4, true, 2);
        assert!(manager.record_observation(&up).await);
        assert!(manager.record_observation(&down).await);
        assert_eq!(reputation(&store, "key1").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_node_is_not_updated() {
        let store = Arc::new(MemoryStore::new());
        let manager = ReputationManager::new(store, ReputationPolicy::default());
        assert!(!manager.adjust("ghost", 1).await);
    }

    #[tokio::test]
    async fn test_batch_applies_presummed_deltas() {
        let store = store_with_node("key1", 10).await;
        let manager = ReputationManager::new(store.clone(), ReputationPolicy::default());

        let observations = vec![
            Observation::new("key1", IpVersion::V4, false, 1),
            Observation::new("key1", IpVersion::V6, false, 1),
            Observation::new("ghost", IpVersion::V4, true, 1),
        ];
        assert_eq!(manager.record_batch(&observations).await, 1);
        assert_eq!(reputation(&store, "key1").await, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_lose_nothing() {
        const START: i64 = 5;
        const STEP: i64 = 3;
        let store = store_with_node("key1", START).await;
        let manager = Arc::new(ReputationManager::new(store.clone(), ReputationPolicy::default()));

        let mut handles = Vec::new();
        for i in 0..200 {
            let manager = manager.clone();
            let delta = if i % 2 == 0 { -STEP } else { STEP };
            handles.push(tokio::spawn(async move {
                let applied = manager.adjust("key1", delta).await;
                (delta, applied)
            }));
        }

        let mut expected = START;
        let mut lowest = START;
        for handle in handles {
            let (delta, applied) = handle.await.unwrap();
            if applied {
                expected += delta;
            }
            lowest = lowest.min(reputation(&store, "key1").await);
        }

        assert_eq!(reputation(&store, "key1").await, expected);
        assert!(lowest >= 0);
        assert!(expected >= 0);
    }
}
