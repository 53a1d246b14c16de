//! Database Connection Pool using sqlx

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::{NodeFilter, StatusStore, StoreResult};
use crate::config::DatabaseConfig;
use crate::database::nodes::NodeRepository;
use crate::database::observations::ObservationRepository;
use crate::database::reports::ReportRepository;
use crate::error::StoreError;
use crate::models::{IpVersion, NodeKind, NodeState, Observation, RegisteredNode, StatusReport};

pub struct DatabasePool {
    pool: PgPool,
    observations: ObservationRepository,
    reports: ReportRepository,
    nodes: NodeRepository,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");

        Ok(Self {
            observations: ObservationRepository::new(pool.clone()),
            reports: ReportRepository::new(pool.clone()),
            nodes: NodeRepository::new(pool.clone()),
            pool,
        })
    }

    /// Create the `directory` schema and its tables if missing
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        info!("Initializing database schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS directory")
            .execute(&self.pool)
            .await?;

        self.observations.init_schema().await?;
        self.reports.init_schema().await?;
        self.nodes.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn observations(&self) -> &ObservationRepository {
        &self.observations
    }

    pub fn reports(&self) -> &ReportRepository {
        &self.reports
    }

    pub fn nodes(&self) -> &NodeRepository {
        &self.nodes
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StatusStore for DatabasePool {
    async fn add_observation(&self, observation: &Observation) -> StoreResult<()> {
        self.observations.insert(observation).await
    }

    async fn batch_add_observations(&self, observations: &[Observation]) -> StoreResult<()> {
        self.observations.insert_batch(observations).await
    }

    async fn list_observations(
        &self,
        identity: &str,
        limit: usize,
    ) -> StoreResult<Vec<Observation>> {
        self.observations.list(identity, limit).await
    }

    async fn list_observations_since(
        &self,
        identity: &str,
        ip_version: IpVersion,
        since: i64,
    ) -> StoreResult<Vec<Observation>> {
        self.observations.list_since(identity, ip_version, since).await
    }

    async fn list_most_recent_observations(
        &self,
        identity: &str,
        ip_version: IpVersion,
        limit: usize,
    ) -> StoreResult<Vec<Observation>> {
        self.observations.list_most_recent(identity, ip_version, limit).await
    }

    async fn list_active_identities(&self, since: i64) -> StoreResult<Vec<String>> {
        self.observations.active_identities(since).await
    }

    async fn purge_observations_before(&self, before: i64) -> StoreResult<u64> {
        self.observations.purge_before(before).await
    }

    async fn load_report(&self, identity: &str) -> StoreResult<Option<StatusReport>> {
        self.reports.load(identity).await
    }

    async fn batch_load_reports(&self, identities: &[String]) -> StoreResult<Vec<StatusReport>> {
        self.reports.load_batch(identities).await
    }

    async fn save_report(&self, report: &StatusReport) -> StoreResult<()> {
        self.reports.save(report).await
    }

    async fn batch_save_reports(&self, reports: &[StatusReport]) -> StoreResult<()> {
        self.reports.save_batch(reports).await
    }

    async fn list_non_stale_reports(&self) -> StoreResult<Vec<StatusReport>> {
        self.reports.non_stale().await
    }

    async fn upsert_registered_node(&self, node: &RegisteredNode) -> StoreResult<()> {
        self.nodes.upsert(node).await
    }

    async fn delete_registered_node(&self, identity: &str) -> StoreResult<bool> {
        self.nodes.delete(identity).await
    }

    async fn resolve_node(
        &self,
        identity: &str,
    ) -> StoreResult<Option<(NodeState, RegisteredNode)>> {
        self.nodes.resolve(identity).await
    }

    async fn list_registered_nodes(&self, filter: NodeFilter) -> StoreResult<Vec<RegisteredNode>> {
        self.nodes.list_active(filter).await
    }

    async fn list_removed_nodes(&self) -> StoreResult<Vec<RegisteredNode>> {
        self.nodes.list_removed().await
    }

    async fn count_registered(&self, kind: NodeKind) -> StoreResult<usize> {
        self.nodes.count(kind).await
    }

    async fn move_to_removed_set(&self, identity: &str) -> StoreResult<bool> {
        self.nodes.move_to_removed(identity).await
    }

    async fn batch_move_to_removed_set(&self, identities: &[String]) -> StoreResult<u64> {
        self.nodes.batch_move_to_removed(identities).await
    }

    async fn address_in_use(&self, host: &str, except_identity: &str) -> StoreResult<bool> {
        self.nodes.host_in_use(host, except_identity).await
    }

    async fn adjust_reputation_conditional(
        &self,
        identity: &str,
        delta: i64,
    ) -> StoreResult<bool> {
        self.nodes.adjust_reputation(identity, delta).await
    }

    async fn set_reputation(&self, identity: &str, value: i64) -> StoreResult<bool> {
        self.nodes.set_reputation(identity, value).await
    }

    async fn batch_set_reputation(&self, values: &HashMap<String, i64>) -> StoreResult<u64> {
        self.nodes.batch_set_reputation(values).await
    }
}
