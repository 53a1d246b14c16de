//! Directory Service
//!
//! Facade over the core components. Everything is injected through `new`, so
//! tests can run the full pipeline on a `MemoryStore` and a `ManualClock`.
//!
//! Observation pipeline:
//!
//! ```text
//! NodeStatus ─► Observation ─► store ─► ReportBuilder ─► save report
//!                                            │
//!                                            ├─► ReputationManager
//!                                            └─► AdmissionController (eviction)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionController, EvictionPolicy};
use crate::clock::{duration_nanos, minutes_before, Clock};
use crate::config::DirectoryConfig;
use crate::database::{StatusStore, HISTORY_LIMIT};
use crate::error::DirectoryError;
use crate::models::{
    BatchNodeStatus, BatchStatusReport, GatewayRegistrationInfo, MixRegistrationInfo, NodeState,
    NodeStatus, Observation, RegisteredNode, StatusReport, Topology,
};
use crate::report::ReportBuilder;
use crate::reputation::{ReputationManager, ReputationPolicy};
use crate::topology::{StoreTopologySource, TopologyCache, TopologyView};
use crate::uptime::{ReportWindow, UptimeCalculator};

pub struct DirectoryService {
    store: Arc<dyn StatusStore>,
    clock: Arc<dyn Clock>,
    reports: ReportBuilder,
    reputation: ReputationManager,
    admission: AdmissionController,
    topology: TopologyCache,
    retention: i64,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn StatusStore>, clock: Arc<dyn Clock>, config: &DirectoryConfig) -> Self {
        let policy = ReputationPolicy::from(&config.reputation);
        let uptime = Arc::new(UptimeCalculator::new(store.clone(), config.uptime.clone()));

        let source = Arc::new(StoreTopologySource::new(store.clone(), policy.active_threshold));

        Self {
            reports: ReportBuilder::new(uptime),
            reputation: ReputationManager::new(store.clone(), policy),
            admission: AdmissionController::new(
                store.clone(),
                clock.clone(),
                config.admission.clone(),
                EvictionPolicy::new(config.reputation.eviction_threshold),
            ),
            topology: TopologyCache::new(source, clock.clone(), config.topology.cache_ttl()),
            retention: duration_nanos(config.scheduler.retention()),
            store,
            clock,
        }
    }

    /// Load counts, purge outdated nodes and build the topology snapshots
    pub async fn bootstrap(&self) -> Result<(), DirectoryError> {
        self.admission.refresh_counts().await;
        self.startup_purge().await?;
        self.topology.prime().await;
        info!(
            mix_nodes = self.current_mix_count(),
            gateways = self.current_gateway_count(),
            "Directory bootstrapped"
        );
        Ok(())
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // Observations

    pub async fn submit_observation(&self, status: NodeStatus) -> Result<StatusReport, DirectoryError> {
        let observation = status.into_observation(self.clock.now_nanos())?;

        self.store.add_observation(&observation).await?;

        let mut report = match self.store.load_report(&observation.identity).await {
            Ok(Some(report)) => report,
            Ok(None) => StatusReport::new(&observation.identity),
            Err(e) => {
                error!(identity = %observation.identity, error = %e, "Failed to load report");
                StatusReport::new(&observation.identity)
            }
        };

        self.reports.apply_observation(&mut report, &observation).await;

        if let Err(e) = self.store.save_report(&report).await {
            error!(identity = %observation.identity, error = %e, "Failed to save report");
        }

        self.reputation.record_observation(&observation).await;

        if !observation.up {
            self.admission.evict_if_needed(&report).await;
        }

        debug!(
            identity = %observation.identity,
            ip_version = %observation.ip_version,
            up = observation.up,
            "Observation recorded"
        );
        Ok(report)
    }

    pub async fn submit_observation_batch(
        &self,
        batch: BatchNodeStatus,
    ) -> Result<BatchStatusReport, DirectoryError> {
        let now = self.clock.now_nanos();
        let observations = batch
            .status
            .into_iter()
            .map(|status| status.into_observation(now))
            .collect::<Result<Vec<Observation>, DirectoryError>>()?;

        if observations.is_empty() {
            return Ok(BatchStatusReport::default());
        }

        self.store.batch_add_observations(&observations).await?;

        let identities = unique_identities(&observations);
        let existing = match self.store.batch_load_reports(&identities).await {
            Ok(reports) => reports,
            Err(e) => {
                error!(nodes = identities.len(), error = %e, "Failed to load reports for batch");
                Vec::new()
            }
        };

        let reports = self.reports.apply_batch(existing, &observations).await;

        if let Err(e) = self.store.batch_save_reports(&reports).await {
            error!(reports = reports.len(), error = %e, "Failed to save report batch");
        }

        let applied = self.reputation.record_batch(&observations).await;

        let down: HashSet<&str> = observations
            .iter()
            .filter(|o| !o.up)
            .map(|o| o.identity.as_str())
            .collect();
        let candidates: Vec<StatusReport> = reports
            .iter()
            .filter(|r| down.contains(r.identity.as_str()))
            .cloned()
            .collect();
        let evicted = self.admission.evict_batch(&candidates).await;

        info!(
            observations = observations.len(),
            nodes = reports.len(),
            reputation_updates = applied,
            evicted,
            "Observation batch recorded"
        );
        Ok(BatchStatusReport { report: reports })
    }

    /// Newest observations for a node, empty on storage failure
    pub async fn list_observations(&self, identity: &str) -> Vec<Observation> {
        match self.store.list_observations(identity, HISTORY_LIMIT).await {
            Ok(observations) => observations,
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to list observations");
                Vec::new()
            }
        }
    }

    /// The node's report, or an empty one when none exists
    pub async fn get_report(&self, identity: &str) -> StatusReport {
        match self.store.load_report(identity).await {
            Ok(report) => report.unwrap_or_default(),
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to load report");
                StatusReport::default()
            }
        }
    }

    pub async fn get_non_stale_report_batch(&self) -> BatchStatusReport {
        match self.store.list_non_stale_reports().await {
            Ok(report) => BatchStatusReport { report },
            Err(e) => {
                error!(error = %e, "Failed to list non-stale reports");
                BatchStatusReport::default()
            }
        }
    }

    // Registration

    pub async fn register_mix(&self, info: MixRegistrationInfo) -> Result<RegisteredNode, DirectoryError> {
        let node = self.admission.register_mix(info).await?;
        self.topology.invalidate_all();
        Ok(node)
    }

    pub async fn register_gateway(
        &self,
        info: GatewayRegistrationInfo,
    ) -> Result<RegisteredNode, DirectoryError> {
        let node = self.admission.register_gateway(info).await?;
        self.topology.invalidate_all();
        Ok(node)
    }

    pub async fn unregister_node(
        &self,
        identity: &str,
        caller_address: &str,
    ) -> Result<NodeState, DirectoryError> {
        let state = self.admission.unregister_node(identity, caller_address).await?;
        self.topology.invalidate_all();
        Ok(state)
    }

    pub async fn set_reputation(&self, identity: &str, value: i64) -> Result<(), DirectoryError> {
        self.admission.set_reputation(identity, value).await
    }

    pub async fn batch_set_reputation(&self, values: &HashMap<String, i64>) -> Result<u64, DirectoryError> {
        self.admission.batch_set_reputation(values).await
    }

    pub fn current_mix_count(&self) -> usize {
        self.admission.current_mix_count()
    }

    pub fn current_gateway_count(&self) -> usize {
        self.admission.current_gateway_count()
    }

    pub async fn startup_purge(&self) -> Result<u64, DirectoryError> {
        let moved = self.admission.startup_purge().await?;
        if moved > 0 {
            self.topology.invalidate_all();
        }
        Ok(moved)
    }

    // Topology

    pub async fn get_topology(&self) -> Arc<Topology> {
        self.topology.get(TopologyView::Full).await
    }

    pub async fn get_active_topology(&self) -> Arc<Topology> {
        self.topology.get(TopologyView::Active).await
    }

    pub async fn get_removed_topology(&self) -> Arc<Topology> {
        self.topology.get(TopologyView::Removed).await
    }

    // Background work

    /// Recompute daily uptime for every node seen in the last day, persist
    /// the batch and run the eviction sweep over it
    pub async fn refresh_last_day_reports(&self) -> BatchStatusReport {
        let now = self.clock.now_nanos();
        let since = minutes_before(now, ReportWindow::LastDay.minutes());

        let identities = match self.store.list_active_identities(since).await {
            Ok(identities) => identities,
            Err(e) => {
                error!(error = %e, "Failed to list active nodes");
                return BatchStatusReport::default();
            }
        };

        if identities.is_empty() {
            debug!("No active nodes in the last day");
            return BatchStatusReport::default();
        }

        let mut reports = match self.store.batch_load_reports(&identities).await {
            Ok(reports) => reports,
            Err(e) => {
                error!(nodes = identities.len(), error = %e, "Failed to load reports for daily refresh");
                return BatchStatusReport::default();
            }
        };

        let known: HashSet<String> = reports.iter().map(|r| r.identity.clone()).collect();
        for identity in identities.iter().filter(|id| !known.contains(*id)) {
            warn!(identity = %identity, "Active node without a report, starting a fresh one");
            reports.push(StatusReport::new(identity));
        }

        let refreshed = self.reports.refresh_last_day(reports, now).await;

        if let Err(e) = self.store.batch_save_reports(&refreshed).await {
            error!(reports = refreshed.len(), error = %e, "Failed to save daily reports");
            return BatchStatusReport::default();
        }

        let evicted = self.admission.evict_batch(&refreshed).await;
        info!(
            active = identities.len(),
            refreshed = refreshed.len(),
            evicted,
            "Daily uptime refresh complete"
        );

        BatchStatusReport { report: refreshed }
    }

    /// Delete observations older than the retention period
    pub async fn purge_old_observations(&self) -> Result<u64, DirectoryError> {
        let before = self.clock.now_nanos().saturating_sub(self.retention);
        let deleted = self.store.purge_observations_before(before).await?;
        info!(deleted, "Old observations purged");
        Ok(deleted)
    }
}

fn unique_identities(observations: &[Observation]) -> Vec<String> {
    let mut seen = HashSet::new();
    observations
        .iter()
        .filter(|o| seen.insert(o.identity.as_str()))
        .map(|o| o.identity.clone())
        .collect()
}
