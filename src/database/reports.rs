//! Report Repository - one summary row per node, overwritten by primary key

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

use super::{StoreResult, MAX_REPORTS_PER_SAVE};
use crate::models::StatusReport;

const REPORT_COLUMNS: &str = "identity, owner, \
    most_recent_ipv4, last_5_minutes_ipv4, last_hour_ipv4, last_day_ipv4, \
    most_recent_ipv6, last_5_minutes_ipv6, last_hour_ipv6, last_day_ipv6, \
    last_day_computed";

const REPORT_UPSERT_TAIL: &str = " ON CONFLICT (identity) DO UPDATE SET \
    owner = COALESCE(EXCLUDED.owner, directory.reports.owner), \
    most_recent_ipv4 = EXCLUDED.most_recent_ipv4, \
    last_5_minutes_ipv4 = EXCLUDED.last_5_minutes_ipv4, \
    last_hour_ipv4 = EXCLUDED.last_hour_ipv4, \
    last_day_ipv4 = EXCLUDED.last_day_ipv4, \
    most_recent_ipv6 = EXCLUDED.most_recent_ipv6, \
    last_5_minutes_ipv6 = EXCLUDED.last_5_minutes_ipv6, \
    last_hour_ipv6 = EXCLUDED.last_hour_ipv6, \
    last_day_ipv6 = EXCLUDED.last_day_ipv6, \
    last_day_computed = EXCLUDED.last_day_computed";

pub struct ReportRepository {
    pool: PgPool,
}

impl ReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS directory.reports (
                identity VARCHAR(255) PRIMARY KEY,
                owner VARCHAR(255),
                most_recent_ipv4 BOOLEAN NOT NULL DEFAULT FALSE,
                last_5_minutes_ipv4 SMALLINT NOT NULL DEFAULT 0,
                last_hour_ipv4 SMALLINT NOT NULL DEFAULT 0,
                last_day_ipv4 SMALLINT NOT NULL DEFAULT 0,
                most_recent_ipv6 BOOLEAN NOT NULL DEFAULT FALSE,
                last_5_minutes_ipv6 SMALLINT NOT NULL DEFAULT 0,
                last_hour_ipv6 SMALLINT NOT NULL DEFAULT 0,
                last_day_ipv6 SMALLINT NOT NULL DEFAULT 0,
                last_day_computed BOOLEAN NOT NULL DEFAULT FALSE
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load(&self, identity: &str) -> StoreResult<Option<StatusReport>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM directory.reports WHERE identity = $1",
            REPORT_COLUMNS
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(report_from_row))
    }

    pub async fn load_batch(&self, identities: &[String]) -> StoreResult<Vec<StatusReport>> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM directory.reports WHERE identity = ANY($1)",
            REPORT_COLUMNS
        ))
        .bind(identities)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    pub async fn save(&self, report: &StatusReport) -> StoreResult<()> {
        self.save_batch(std::slice::from_ref(report)).await
    }

    pub async fn save_batch(&self, reports: &[StatusReport]) -> StoreResult<()> {
        for chunk in reports.chunks(MAX_REPORTS_PER_SAVE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO directory.reports ({}) ",
                REPORT_COLUMNS
            ));
            builder.push_values(chunk, |mut row, report| {
                row.push_bind(&report.identity)
                    .push_bind(&report.owner)
                    .push_bind(report.most_recent_ipv4)
                    .push_bind(i16::from(report.last_5_minutes_ipv4))
                    .push_bind(i16::from(report.last_hour_ipv4))
                    .push_bind(i16::from(report.last_day_ipv4))
                    .push_bind(report.most_recent_ipv6)
                    .push_bind(i16::from(report.last_5_minutes_ipv6))
                    .push_bind(i16::from(report.last_hour_ipv6))
                    .push_bind(i16::from(report.last_day_ipv6))
                    .push_bind(report.last_day_computed);
            });
            builder.push(REPORT_UPSERT_TAIL);
            builder.build().execute(&self.pool).await?;
            debug!(rows = chunk.len(), "Saved report chunk");
        }
        Ok(())
    }

    pub async fn non_stale(&self) -> StoreResult<Vec<StatusReport>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM directory.reports \
             WHERE last_day_ipv4 > 0 OR last_day_ipv6 > 0 \
             ORDER BY identity",
            REPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(report_from_row).collect())
    }
}

fn percent(row: &PgRow, column: &str) -> u8 {
    let value: i16 = row.get(column);
    value.clamp(0, 100) as u8
}

fn report_from_row(row: &PgRow) -> StatusReport {
    StatusReport {
        identity: row.get("identity"),
        owner: row.get("owner"),
        most_recent_ipv4: row.get("most_recent_ipv4"),
        last_5_minutes_ipv4: percent(row, "last_5_minutes_ipv4"),
        last_hour_ipv4: percent(row, "last_hour_ipv4"),
        last_day_ipv4: percent(row, "last_day_ipv4"),
        most_recent_ipv6: row.get("most_recent_ipv6"),
        last_5_minutes_ipv6: percent(row, "last_5_minutes_ipv6"),
        last_hour_ipv6: percent(row, "last_hour_ipv6"),
        last_day_ipv6: percent(row, "last_day_ipv6"),
        last_day_computed: row.get("last_day_computed"),
    }
}
