//! In-memory status store
//!
//! Every operation takes the single state lock once, so conditional updates are
//! atomic the same way a single SQL statement is.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{NodeFilter, StatusStore, StoreResult};
use crate::models::{IpVersion, NodeKind, NodeState, Observation, RegisteredNode, StatusReport};

#[derive(Debug, Clone)]
struct StoredNode {
    node: RegisteredNode,
    removed: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    observations: Vec<Observation>,
    reports: HashMap<String, StatusReport>,
    // Ordered so listings come back sorted by identity like the SQL backend
    nodes: BTreeMap<String, StoredNode>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observation_count(&self) -> usize {
        self.state.read().observations.len()
    }
}

fn newest_first(mut observations: Vec<Observation>) -> Vec<Observation> {
    observations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    observations
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn add_observation(&self, observation: &Observation) -> StoreResult<()> {
        self.state.write().observations.push(observation.clone());
        Ok(())
    }

    async fn batch_add_observations(&self, observations: &[Observation]) -> StoreResult<()> {
        self.state
            .write()
            .observations
            .extend(observations.iter().cloned());
        Ok(())
    }

    async fn list_observations(
        &self,
        identity: &str,
        limit: usize,
    ) -> StoreResult<Vec<Observation>> {
        let matching = self
            .state
            .read()
            .observations
            .iter()
            .filter(|o| o.identity == identity)
            .cloned()
            .collect();
        let mut sorted = newest_first(matching);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn list_observations_since(
        &self,
        identity: &str,
        ip_version: IpVersion,
        since: i64,
    ) -> StoreResult<Vec<Observation>> {
        let matching = self
            .state
            .read()
            .observations
            .iter()
            .filter(|o| o.identity == identity && o.ip_version == ip_version && o.timestamp >= since)
            .cloned()
            .collect();
        Ok(newest_first(matching))
    }

    async fn list_most_recent_observations(
        &self,
        identity: &str,
        ip_version: IpVersion,
        limit: usize,
    ) -> StoreResult<Vec<Observation>> {
        let matching = self
            .state
            .read()
            .observations
            .iter()
            .filter(|o| o.identity == identity && o.ip_version == ip_version)
            .cloned()
            .collect();
        let mut sorted = newest_first(matching);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn list_active_identities(&self, since: i64) -> StoreResult<Vec<String>> {
        let state = self.state.read();
        let mut seen = HashSet::new();
        let mut identities = Vec::new();
        for observation in state.observations.iter().filter(|o| o.timestamp > since) {
            if seen.insert(observation.identity.as_str()) {
                identities.push(observation.identity.clone());
            }
        }
        Ok(identities)
    }

    async fn purge_observations_before(&self, before: i64) -> StoreResult<u64> {
        let mut state = self.state.write();
        let initial = state.observations.len();
        state.observations.retain(|o| o.timestamp >= before);
        Ok((initial - state.observations.len()) as u64)
    }

    async fn load_report(&self, identity: &str) -> StoreResult<Option<StatusReport>> {
        Ok(self.state.read().reports.get(identity).cloned())
    }

    async fn batch_load_reports(&self, identities: &[String]) -> StoreResult<Vec<StatusReport>> {
        let state = self.state.read();
        Ok(identities
            .iter()
            .filter_map(|id| state.reports.get(id).cloned())
            .collect())
    }

    async fn save_report(&self, report: &StatusReport) -> StoreResult<()> {
        self.state
            .write()
            .reports
            .insert(report.identity.clone(), report.clone());
        Ok(())
    }

    async fn batch_save_reports(&self, reports: &[StatusReport]) -> StoreResult<()> {
        let mut state = self.state.write();
        for report in reports {
            state.reports.insert(report.identity.clone(), report.clone());
        }
        Ok(())
    }

    async fn list_non_stale_reports(&self) -> StoreResult<Vec<StatusReport>> {
        let mut reports: Vec<StatusReport> = self
            .state
            .read()
            .reports
            .values()
            .filter(|r| !r.is_stale())
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(reports)
    }

    async fn upsert_registered_node(&self, node: &RegisteredNode) -> StoreResult<()> {
        let mut state = self.state.write();
        match state.nodes.get_mut(&node.identity) {
            Some(existing) => {
                let reputation = existing.node.reputation;
                let registered_at = node.registered_at.max(existing.node.registered_at + 1);
                existing.node = RegisteredNode {
                    reputation,
                    registered_at,
                    ..node.clone()
                };
                existing.removed = false;
            }
            None => {
                state.nodes.insert(
                    node.identity.clone(),
                    StoredNode {
                        node: node.clone(),
                        removed: false,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_registered_node(&self, identity: &str) -> StoreResult<bool> {
        Ok(self.state.write().nodes.remove(identity).is_some())
    }

    async fn resolve_node(
        &self,
        identity: &str,
    ) -> StoreResult<Option<(NodeState, RegisteredNode)>> {
        Ok(self.state.read().nodes.get(identity).map(|stored| {
            let state = if stored.removed {
                NodeState::Removed
            } else {
                NodeState::Active
            };
            (state, stored.node.clone())
        }))
    }

    async fn list_registered_nodes(&self, filter: NodeFilter) -> StoreResult<Vec<RegisteredNode>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .filter(|stored| !stored.removed && filter.matches(&stored.node))
            .map(|stored| stored.node.clone())
            .collect())
    }

    async fn list_removed_nodes(&self) -> StoreResult<Vec<RegisteredNode>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .filter(|stored| stored.removed)
            .map(|stored| stored.node.clone())
            .collect())
    }

    async fn count_registered(&self, kind: NodeKind) -> StoreResult<usize> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .filter(|stored| !stored.removed && stored.node.kind == kind)
            .count())
    }

    async fn move_to_removed_set(&self, identity: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        match state.nodes.get_mut(identity) {
            Some(stored) if !stored.removed => {
                stored.removed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn batch_move_to_removed_set(&self, identities: &[String]) -> StoreResult<u64> {
        let mut state = self.state.write();
        let mut moved = 0;
        for identity in identities {
            if let Some(stored) = state.nodes.get_mut(identity) {
                if !stored.removed {
                    stored.removed = true;
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    async fn address_in_use(&self, host: &str, except_identity: &str) -> StoreResult<bool> {
        Ok(self.state.read().nodes.values().any(|stored| {
            !stored.removed && stored.node.identity != except_identity && stored.node.host() == host
        }))
    }

    async fn adjust_reputation_conditional(
        &self,
        identity: &str,
        delta: i64,
    ) -> StoreResult<bool> {
        let mut state = self.state.write();
        match state.nodes.get_mut(identity) {
            Some(stored) if !stored.removed && (delta >= 0 || stored.node.reputation >= -delta) => {
                stored.node.reputation += delta;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_reputation(&self, identity: &str, value: i64) -> StoreResult<bool> {
        let mut state = self.state.write();
        match state.nodes.get_mut(identity) {
            Some(stored) => {
                stored.node.reputation = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn batch_set_reputation(&self, values: &HashMap<String, i64>) -> StoreResult<u64> {
        let mut state = self.state.write();
        let mut updated = 0;
        for (identity, value) in values {
            if let Some(stored) = state.nodes.get_mut(identity) {
                stored.node.reputation = *value;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
