//! Node Repository - registered and removed node sets
//!
//! Both sets live in one table; `removed` flags membership so an identity can
//! never be in both.

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{NodeFilter, StoreResult};
use crate::models::{NodeKind, NodeState, RegisteredNode};

const NODE_COLUMNS: &str = "identity, kind, mix_host, clients_host, sphinx_key, version, \
    location, incentives_address, layer, reputation, registered_at, removed";

pub struct NodeRepository {
    pool: PgPool,
}

impl NodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS directory.nodes (
                identity VARCHAR(255) PRIMARY KEY,
                kind VARCHAR(16) NOT NULL,
                host VARCHAR(255) NOT NULL,
                mix_host VARCHAR(255) NOT NULL,
                clients_host VARCHAR(255),
                sphinx_key VARCHAR(255) NOT NULL,
                version VARCHAR(64) NOT NULL,
                location VARCHAR(255) NOT NULL DEFAULT '',
                incentives_address VARCHAR(255) NOT NULL DEFAULT '',
                layer INTEGER,
                reputation BIGINT NOT NULL DEFAULT 0,
                registered_at BIGINT NOT NULL,
                removed BOOLEAN NOT NULL DEFAULT FALSE
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_kind ON directory.nodes(kind, removed)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_host ON directory.nodes(host)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Reputation is left alone on conflict; `registered_at` always moves forward
    pub async fn upsert(&self, node: &RegisteredNode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO directory.nodes
                (identity, kind, host, mix_host, clients_host, sphinx_key, version,
                 location, incentives_address, layer, reputation, registered_at, removed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE)
            ON CONFLICT (identity) DO UPDATE SET
                kind = EXCLUDED.kind,
                host = EXCLUDED.host,
                mix_host = EXCLUDED.mix_host,
                clients_host = EXCLUDED.clients_host,
                sphinx_key = EXCLUDED.sphinx_key,
                version = EXCLUDED.version,
                location = EXCLUDED.location,
                incentives_address = EXCLUDED.incentives_address,
                layer = EXCLUDED.layer,
                registered_at = GREATEST(EXCLUDED.registered_at, directory.nodes.registered_at + 1),
                removed = FALSE
        "#,
        )
        .bind(&node.identity)
        .bind(node.kind.as_str())
        .bind(node.host())
        .bind(&node.network_address)
        .bind(&node.clients_host)
        .bind(&node.sphinx_key)
        .bind(&node.software_version)
        .bind(&node.location)
        .bind(&node.incentives_address)
        .bind(node.layer.map(|l| l as i32))
        .bind(node.reputation)
        .bind(node.registered_at)
        .execute(&self.pool)
        .await?;

        debug!(identity = %node.identity, kind = %node.kind, "Upserted node");
        Ok(())
    }

    pub async fn delete(&self, identity: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM directory.nodes WHERE identity = $1")
            .bind(identity)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn resolve(&self, identity: &str) -> StoreResult<Option<(NodeState, RegisteredNode)>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM directory.nodes WHERE identity = $1",
            NODE_COLUMNS
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let removed: bool = row.get("removed");
                let state = if removed { NodeState::Removed } else { NodeState::Active };
                Ok(Some((state, node_from_row(&row)?)))
            }
            None => Ok(None),
        }
    }

    pub async fn list_active(&self, filter: NodeFilter) -> StoreResult<Vec<RegisteredNode>> {
        let rows = match filter {
            NodeFilter::All => {
                sqlx::query(&format!(
                    "SELECT {} FROM directory.nodes WHERE removed = FALSE ORDER BY identity",
                    NODE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
            NodeFilter::ReputationAtLeast(threshold) => {
                sqlx::query(&format!(
                    "SELECT {} FROM directory.nodes \
                     WHERE removed = FALSE AND reputation >= $1 ORDER BY identity",
                    NODE_COLUMNS
                ))
                .bind(threshold)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(node_from_row).collect()
    }

    pub async fn list_removed(&self) -> StoreResult<Vec<RegisteredNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM directory.nodes WHERE removed = TRUE ORDER BY identity",
            NODE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    pub async fn count(&self, kind: NodeKind) -> StoreResult<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM directory.nodes WHERE kind = $1 AND removed = FALSE",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.get("total");
        Ok(total.max(0) as usize)
    }

    pub async fn move_to_removed(&self, identity: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE directory.nodes SET removed = TRUE WHERE identity = $1 AND removed = FALSE",
        )
        .bind(identity)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn batch_move_to_removed(&self, identities: &[String]) -> StoreResult<u64> {
        if identities.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE directory.nodes SET removed = TRUE WHERE identity = ANY($1) AND removed = FALSE",
        )
        .bind(identities)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn host_in_use(&self, host: &str, except_identity: &str) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM directory.nodes
                WHERE host = $1 AND removed = FALSE AND identity <> $2
            ) AS in_use
        "#,
        )
        .bind(host)
        .bind(except_identity)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("in_use"))
    }

    /// Single conditional statement so concurrent adjustments cannot race
    /// the floor check
    pub async fn adjust_reputation(&self, identity: &str, delta: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE directory.nodes
            SET reputation = reputation + $2
            WHERE identity = $1 AND removed = FALSE AND ($2 >= 0 OR reputation >= -$2)
        "#,
        )
        .bind(identity)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reputation(&self, identity: &str, value: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE directory.nodes SET reputation = $2 WHERE identity = $1")
            .bind(identity)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Each entry is applied on its own; one failure does not undo the others
    pub async fn batch_set_reputation(&self, values: &HashMap<String, i64>) -> StoreResult<u64> {
        let mut updated = 0;
        for (identity, value) in values {
            match self.set_reputation(identity, *value).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => warn!(identity = %identity, error = %e, "Failed to set reputation"),
            }
        }
        Ok(updated)
    }
}

fn node_from_row(row: &PgRow) -> StoreResult<RegisteredNode> {
    let kind: String = row.get("kind");
    let layer: Option<i32> = row.get("layer");

    Ok(RegisteredNode {
        identity: row.get("identity"),
        kind: kind.parse()?,
        network_address: row.get("mix_host"),
        sphinx_key: row.get("sphinx_key"),
        software_version: row.get("version"),
        location: row.get("location"),
        incentives_address: row.get("incentives_address"),
        layer: layer.map(|l| l.max(0) as u32),
        clients_host: row.get("clients_host"),
        reputation: row.get("reputation"),
        registered_at: row.get("registered_at"),
    })
}
