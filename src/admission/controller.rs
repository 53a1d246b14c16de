//! Registration Admission Controller
//!
//! Gatekeeper for the registered set and owner of the registered/removed
//! lifecycle:
//!
//! ```text
//! Unregistered ──register──► Registered ──evict / purge──► Removed
//!                                ▲                            │
//!                                └────────re-register─────────┘
//! ```
//!
//! Cheap checks run against cached counts first. The capacity check that
//! matters is repeated under the registration lock against a fresh count, so
//! two registrants cannot both take the last slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::address::{normalize_host, same_host};
use crate::admission::EvictionPolicy;
use crate::clock::Clock;
use crate::config::AdmissionConfig;
use crate::database::{NodeFilter, StatusStore};
use crate::error::{ConflictReason, DirectoryError};
use crate::models::{
    GatewayRegistrationInfo, MixRegistrationInfo, NodeKind, NodeState, RegisteredNode,
    StatusReport,
};

pub struct AdmissionController {
    store: Arc<dyn StatusStore>,
    clock: Arc<dyn Clock>,
    config: AdmissionConfig,
    eviction: EvictionPolicy,
    mix_count: AtomicUsize,
    gateway_count: AtomicUsize,
    /// Shared by mix and gateway registration
    registration_lock: Mutex<()>,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn StatusStore>,
        clock: Arc<dyn Clock>,
        config: AdmissionConfig,
        eviction: EvictionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            eviction,
            mix_count: AtomicUsize::new(0),
            gateway_count: AtomicUsize::new(0),
            registration_lock: Mutex::new(()),
        }
    }

    pub fn eviction_policy(&self) -> &EvictionPolicy {
        &self.eviction
    }

    pub fn current_mix_count(&self) -> usize {
        self.mix_count.load(Ordering::Acquire)
    }

    pub fn current_gateway_count(&self) -> usize {
        self.gateway_count.load(Ordering::Acquire)
    }

    fn ceiling(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Mix => self.config.max_mixnodes,
            NodeKind::Gateway => self.config.max_gateways,
        }
    }

    fn cached_count(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Mix => self.current_mix_count(),
            NodeKind::Gateway => self.current_gateway_count(),
        }
    }

    fn check_capacity(&self, kind: NodeKind, count: usize) -> Result<(), DirectoryError> {
        let ceiling = self.ceiling(kind);
        if count >= ceiling {
            return Err(DirectoryError::conflict(ConflictReason::AtCapacity { kind, ceiling }));
        }
        Ok(())
    }

    /// An active node of the same kind is updated in place and does not take
    /// a new slot
    async fn holds_slot(&self, identity: &str, kind: NodeKind) -> Result<bool, DirectoryError> {
        Ok(matches!(
            self.store.resolve_node(identity).await?,
            Some((NodeState::Active, existing)) if existing.kind == kind
        ))
    }

    /// Reload both cached counts from the store. Failures keep the old values.
    pub async fn refresh_counts(&self) {
        for (kind, slot) in [
            (NodeKind::Mix, &self.mix_count),
            (NodeKind::Gateway, &self.gateway_count),
        ] {
            match self.store.count_registered(kind).await {
                Ok(count) => slot.store(count, Ordering::Release),
                Err(e) => error!(kind = %kind, error = %e, "Failed to refresh node count"),
            }
        }
    }

    pub async fn register_mix(&self, info: MixRegistrationInfo) -> Result<RegisteredNode, DirectoryError> {
        let node = RegisteredNode::from_mix(info, self.clock.now_nanos());
        self.register(node).await
    }

    pub async fn register_gateway(
        &self,
        info: GatewayRegistrationInfo,
    ) -> Result<RegisteredNode, DirectoryError> {
        let node = RegisteredNode::from_gateway(info, self.clock.now_nanos());
        self.register(node).await
    }

    async fn register(&self, node: RegisteredNode) -> Result<RegisteredNode, DirectoryError> {
        let kind = node.kind;

        if node.identity.trim().is_empty() {
            return Err(DirectoryError::InvalidInput("identityKey must not be empty".to_string()));
        }

        let refreshing = self.holds_slot(&node.identity, kind).await?;
        if !refreshing {
            self.check_capacity(kind, self.cached_count(kind))?;
        }

        let host = normalize_host(&node.network_address).ok_or_else(|| {
            DirectoryError::InvalidInput(format!("invalid mixHost `{}`", node.network_address))
        })?;
        if self.store.address_in_use(&host, &node.identity).await? {
            return Err(DirectoryError::conflict(ConflictReason::DuplicateAddress { host }));
        }

        if node.software_version != self.config.required_version {
            return Err(DirectoryError::conflict(ConflictReason::VersionMismatch {
                required: self.config.required_version.clone(),
                found: node.software_version.clone(),
            }));
        }

        if !refreshing {
            self.check_capacity(kind, self.cached_count(kind))?;
        }

        {
            let _guard = self.registration_lock.lock().await;

            // The node may have been evicted since the first look
            if !self.holds_slot(&node.identity, kind).await? {
                let current = self.store.count_registered(kind).await?;
                self.check_capacity(kind, current)?;
            }

            if self.store.address_in_use(&host, &node.identity).await? {
                return Err(DirectoryError::conflict(ConflictReason::DuplicateAddress { host }));
            }

            self.store.upsert_registered_node(&node).await?;
        }

        self.refresh_counts().await;

        info!(
            identity = %node.identity,
            kind = %kind,
            host = %host,
            "Node registered"
        );

        // Hand back the stored row: reputation and registration time may differ
        match self.store.resolve_node(&node.identity).await? {
            Some((_, stored)) => Ok(stored),
            None => Ok(node),
        }
    }

    /// Self-service removal, only from the node's own host
    pub async fn unregister_node(
        &self,
        identity: &str,
        caller_address: &str,
    ) -> Result<NodeState, DirectoryError> {
        let (state, node) = self
            .store
            .resolve_node(identity)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("node {}", identity)))?;

        if !same_host(&node.network_address, caller_address) {
            warn!(
                identity = %identity,
                caller = %caller_address,
                "Unregistration attempted from a foreign host"
            );
            return Err(DirectoryError::Forbidden(
                "unregistration must come from the node's own host".to_string(),
            ));
        }

        self.store.delete_registered_node(identity).await?;
        self.refresh_counts().await;

        info!(identity = %identity, state = ?state, "Node unregistered");
        Ok(state)
    }

    /// Admin override, bypasses the zero floor
    pub async fn set_reputation(&self, identity: &str, value: i64) -> Result<(), DirectoryError> {
        if self.store.set_reputation(identity, value).await? {
            info!(identity = %identity, reputation = value, "Reputation overridden");
            Ok(())
        } else {
            Err(DirectoryError::NotFound(format!("node {}", identity)))
        }
    }

    pub async fn batch_set_reputation(
        &self,
        values: &HashMap<String, i64>,
    ) -> Result<u64, DirectoryError> {
        let updated = self.store.batch_set_reputation(values).await?;
        info!(requested = values.len(), updated, "Batch reputation override");
        Ok(updated)
    }

    /// Move a node to the removed set when its daily uptime is too low.
    /// Returns whether the node was moved.
    pub async fn evict_if_needed(&self, report: &StatusReport) -> bool {
        if !self.eviction.should_evict(report) {
            return false;
        }

        match self.store.move_to_removed_set(&report.identity).await {
            Ok(moved) => {
                if moved {
                    info!(
                        identity = %report.identity,
                        last_day_ipv4 = report.last_day_ipv4,
                        last_day_ipv6 = report.last_day_ipv6,
                        "Node moved to removed set"
                    );
                    self.refresh_counts().await;
                }
                moved
            }
            Err(e) => {
                error!(identity = %report.identity, error = %e, "Failed to move node to removed set");
                false
            }
        }
    }

    /// Eviction sweep over a batch of reports; returns how many nodes moved
    pub async fn evict_batch(&self, reports: &[StatusReport]) -> u64 {
        let to_remove: Vec<String> = reports
            .iter()
            .filter(|report| self.eviction.should_evict(report))
            .map(|report| report.identity.clone())
            .collect();

        if to_remove.is_empty() {
            return 0;
        }

        match self.store.batch_move_to_removed_set(&to_remove).await {
            Ok(moved) => {
                debug!(candidates = to_remove.len(), moved, "Eviction sweep");
                if moved > 0 {
                    info!(moved, "Nodes moved to removed set");
                    self.refresh_counts().await;
                }
                moved
            }
            Err(e) => {
                error!(candidates = to_remove.len(), error = %e, "Eviction sweep failed");
                0
            }
        }
    }

    /// Remove every registered node that does not run the required version
    pub async fn startup_purge(&self) -> Result<u64, DirectoryError> {
        let outdated: Vec<String> = self
            .store
            .list_registered_nodes(NodeFilter::All)
            .await?
            .into_iter()
            .filter(|node| node.software_version != self.config.required_version)
            .map(|node| node.identity)
            .collect();

        let moved = if outdated.is_empty() {
            0
        } else {
            self.store.batch_move_to_removed_set(&outdated).await?
        };

        self.refresh_counts().await;

        info!(
            moved,
            required_version = %self.config.required_version,
            "Startup purge of outdated nodes complete"
        );
        Ok(moved)
    }
}
