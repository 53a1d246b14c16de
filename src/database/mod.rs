//! Status Store
//!
//! Append-only observation log, per-node status reports and the node registry
//! (registered and removed sets) behind one object-safe trait. Two backends:
//!
//! - `DatabasePool`: PostgreSQL via sqlx, one repository per table
//! - `MemoryStore`: in-process maps guarded by a single lock

pub mod memory;
pub mod nodes;
pub mod observations;
pub mod pool;
pub mod reports;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{IpVersion, NodeKind, NodeState, Observation, RegisteredNode, StatusReport};

pub use memory::MemoryStore;
pub use nodes::NodeRepository;
pub use observations::ObservationRepository;
pub use pool::DatabasePool;
pub use reports::ReportRepository;

/// Rows per multi-row observation insert
pub const MAX_OBSERVATIONS_PER_INSERT: usize = 3000;

/// Rows per multi-row report upsert
pub const MAX_REPORTS_PER_SAVE: usize = 2000;

/// Entries returned by the history listing
pub const HISTORY_LIMIT: usize = 1000;

pub type StoreResult<T> = Result<T, StoreError>;

/// Which registered nodes to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    ReputationAtLeast(i64),
}

impl NodeFilter {
    pub fn matches(&self, node: &RegisteredNode) -> bool {
        match self {
            NodeFilter::All => true,
            NodeFilter::ReputationAtLeast(threshold) => node.reputation >= *threshold,
        }
    }
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    // Observations

    async fn add_observation(&self, observation: &Observation) -> StoreResult<()>;

    async fn batch_add_observations(&self, observations: &[Observation]) -> StoreResult<()>;

    /// Newest first, both IP versions
    async fn list_observations(&self, identity: &str, limit: usize)
        -> StoreResult<Vec<Observation>>;

    /// Observations at or after `since`, newest first
    async fn list_observations_since(
        &self,
        identity: &str,
        ip_version: IpVersion,
        since: i64,
    ) -> StoreResult<Vec<Observation>>;

    /// The `limit` newest observations, newest first
    async fn list_most_recent_observations(
        &self,
        identity: &str,
        ip_version: IpVersion,
        limit: usize,
    ) -> StoreResult<Vec<Observation>>;

    /// Identities with at least one observation strictly after `since`
    async fn list_active_identities(&self, since: i64) -> StoreResult<Vec<String>>;

    async fn purge_observations_before(&self, before: i64) -> StoreResult<u64>;

    // Reports

    async fn load_report(&self, identity: &str) -> StoreResult<Option<StatusReport>>;

    async fn batch_load_reports(&self, identities: &[String]) -> StoreResult<Vec<StatusReport>>;

    async fn save_report(&self, report: &StatusReport) -> StoreResult<()>;

    /// Identities must be unique within `reports`
    async fn batch_save_reports(&self, reports: &[StatusReport]) -> StoreResult<()>;

    /// Reports with a non-zero daily uptime on either IP version
    async fn list_non_stale_reports(&self) -> StoreResult<Vec<StatusReport>>;

    // Registry

    /// Insert or update by identity; clears the removed flag and keeps reputation
    async fn upsert_registered_node(&self, node: &RegisteredNode) -> StoreResult<()>;

    /// Delete from whichever set holds the identity
    async fn delete_registered_node(&self, identity: &str) -> StoreResult<bool>;

    async fn resolve_node(&self, identity: &str)
        -> StoreResult<Option<(NodeState, RegisteredNode)>>;

    async fn list_registered_nodes(&self, filter: NodeFilter) -> StoreResult<Vec<RegisteredNode>>;

    async fn list_removed_nodes(&self) -> StoreResult<Vec<RegisteredNode>>;

    async fn count_registered(&self, kind: NodeKind) -> StoreResult<usize>;

    async fn move_to_removed_set(&self, identity: &str) -> StoreResult<bool>;

    async fn batch_move_to_removed_set(&self, identities: &[String]) -> StoreResult<u64>;

    /// Whether a registered node other than `except_identity` uses `host`
    async fn address_in_use(&self, host: &str, except_identity: &str) -> StoreResult<bool>;

    /// Add `delta` to an active node's reputation unless the result would go
    /// below zero. Returns whether a row was updated.
    async fn adjust_reputation_conditional(&self, identity: &str, delta: i64)
        -> StoreResult<bool>;

    async fn set_reputation(&self, identity: &str, value: i64) -> StoreResult<bool>;

    async fn batch_set_reputation(&self, values: &HashMap<String, i64>) -> StoreResult<u64>;
}
