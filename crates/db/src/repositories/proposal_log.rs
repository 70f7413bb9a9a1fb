use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deckyard_core::proposal::{ProposalLog, ProposalLogEntry, ProposalLogError};
use sqlx::{sqlite::SqliteRow, Row};

use super::{ProposalLogRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT request_id, submitted_by, client_name, package_type, locations, \
     total_amount, filename, created_at FROM proposal_log";

pub struct SqlProposalLogRepository {
    pool: DbPool,
}

impl SqlProposalLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProposalLogRepository for SqlProposalLogRepository {
    async fn record(&self, entry: &ProposalLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO proposal_log (
                request_id, submitted_by, client_name, package_type, locations,
                total_amount, filename, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.request_id)
        .bind(&entry.submitted_by)
        .bind(&entry.client_name)
        .bind(&entry.package_type)
        .bind(&entry.locations)
        .bind(&entry.total_amount)
        .bind(&entry.filename)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ProposalLogEntry>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE request_id = ?"))
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| entry_from_row(&row)).transpose()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ProposalLogEntry>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, request_id LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn list_for_submitter(&self, submitted_by: &str) -> Result<Vec<ProposalLogEntry>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE submitted_by = ? ORDER BY created_at DESC"))
            .bind(submitted_by)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }
}

#[async_trait]
impl ProposalLog for SqlProposalLogRepository {
    async fn log_proposal(&self, entry: &ProposalLogEntry) -> Result<(), ProposalLogError> {
        self.record(entry).await.map_err(|error| match error {
            RepositoryError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                ProposalLogError::Unavailable(error.to_string())
            }
            other => ProposalLogError::Write(other.to_string()),
        })
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<ProposalLogEntry, RepositoryError> {
    Ok(ProposalLogEntry {
        request_id: row.try_get("request_id")?,
        submitted_by: row.try_get("submitted_by")?,
        client_name: row.try_get("client_name")?,
        package_type: row.try_get("package_type")?,
        locations: row.try_get("locations")?,
        total_amount: row.try_get("total_amount")?,
        filename: row.try_get("filename")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}
