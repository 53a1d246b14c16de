//! Observation Repository - append-only log of up/down observations

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{StoreResult, MAX_OBSERVATIONS_PER_INSERT};
use crate::error::StoreError;
use crate::models::{IpVersion, Observation};

pub struct ObservationRepository {
    pool: PgPool,
}

impl ObservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS directory.observations (
                id BIGSERIAL PRIMARY KEY,
                identity VARCHAR(255) NOT NULL,
                ip_version VARCHAR(1) NOT NULL,
                up BOOLEAN NOT NULL,
                owner VARCHAR(255),
                timestamp BIGINT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_identity_time \
             ON directory.observations(identity, ip_version, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_time ON directory.observations(timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert(&self, observation: &Observation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO directory.observations (identity, ip_version, up, owner, timestamp)
            VALUES ($1, $2, $3, $4, $5)
        "#,
        )
        .bind(&observation.identity)
        .bind(observation.ip_version.as_str())
        .bind(observation.up)
        .bind(&observation.owner)
        .bind(observation.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Multi-row insert, one statement per chunk
    pub async fn insert_batch(&self, observations: &[Observation]) -> StoreResult<()> {
        for chunk in observations.chunks(MAX_OBSERVATIONS_PER_INSERT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO directory.observations (identity, ip_version, up, owner, timestamp) ",
            );
            builder.push_values(chunk, |mut row, observation| {
                row.push_bind(&observation.identity)
                    .push_bind(observation.ip_version.as_str())
                    .push_bind(observation.up)
                    .push_bind(&observation.owner)
                    .push_bind(observation.timestamp);
            });
            builder.build().execute(&self.pool).await?;
            debug!(rows = chunk.len(), "Inserted observation chunk");
        }
        Ok(())
    }

    pub async fn list(&self, identity: &str, limit: usize) -> StoreResult<Vec<Observation>> {
        let rows = sqlx::query(
            r#"
            SELECT identity, ip_version, up, owner, timestamp
            FROM directory.observations
            WHERE identity = $1
            ORDER BY timestamp DESC
            LIMIT $2
        "#,
        )
        .bind(identity)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(observation_from_row).collect()
    }

    pub async fn list_since(
        &self,
        identity: &str,
        ip_version: IpVersion,
        since: i64,
    ) -> StoreResult<Vec<Observation>> {
        let rows = sqlx::query(
            r#"
            SELECT identity, ip_version, up, owner, timestamp
            FROM directory.observations
            WHERE identity = $1 AND ip_version = $2 AND timestamp >= $3
            ORDER BY timestamp DESC
        "#,
        )
        .bind(identity)
        .bind(ip_version.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(observation_from_row).collect()
    }

    pub async fn list_most_recent(
        &self,
        identity: &str,
        ip_version: IpVersion,
        limit: usize,
    ) -> StoreResult<Vec<Observation>> {
        let rows = sqlx::query(
            r#"
            SELECT identity, ip_version, up, owner, timestamp
            FROM directory.observations
            WHERE identity = $1 AND ip_version = $2
            ORDER BY timestamp DESC
            LIMIT $3
        "#,
        )
        .bind(identity)
        .bind(ip_version.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(observation_from_row).collect()
    }

    pub async fn active_identities(&self, since: i64) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT identity FROM directory.observations WHERE timestamp > $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("identity")).collect())
    }

    pub async fn purge_before(&self, before: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM directory.observations WHERE timestamp < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        info!(deleted = result.rows_affected(), "Purged old observations");
        Ok(result.rows_affected())
    }
}

fn observation_from_row(row: &PgRow) -> StoreResult<Observation> {
    let ip_version: String = row.get("ip_version");
    let ip_version = ip_version
        .parse::<IpVersion>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(Observation {
        identity: row.get("identity"),
        ip_version,
        up: row.get("up"),
        owner: row.get("owner"),
        timestamp: row.get("timestamp"),
    })
}
