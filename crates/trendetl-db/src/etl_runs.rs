//! Database operations for the `etl_runs` tracking table.
//!
//! Each pipeline invocation records its window, its status, and which
//! destination tables were fully replaced, so a partially loaded run can be
//! diagnosed after the fact.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `etl_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EtlRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub load_atomicity: String,
    pub status: String,
    pub tables_completed: Vec<String>,
    pub records_extracted: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

const RUN_COLUMNS: &str = "id, public_id, window_start, window_end, load_atomicity, status, \
                           tables_completed, records_extracted, error_message, started_at, \
                           completed_at";

/// Creates a new run in `running` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_etl_run(
    pool: &PgPool,
    window_start: NaiveDate,
    window_end: NaiveDate,
    load_atomicity: &str,
) -> Result<EtlRunRow, DbError> {
    let row = sqlx::query_as::<_, EtlRunRow>(&format!(
        "INSERT INTO etl_runs (public_id, window_start, window_end, load_atomicity, status) \
         VALUES ($1, $2, $3, $4, 'running') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(window_start)
    .bind(window_end)
    .bind(load_atomicity)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `succeeded`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_etl_run(
    pool: &PgPool,
    id: i64,
    tables_completed: &[String],
    records_extracted: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE etl_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             tables_completed = $1, records_extracted = $2 \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(tables_completed)
    .bind(records_extracted)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, keeping the tables that completed before the failure.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn fail_etl_run(
    pool: &PgPool,
    id: i64,
    tables_completed: &[String],
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE etl_runs \
         SET status = 'failed', completed_at = NOW(), \
             tables_completed = $1, error_message = $2 \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(tables_completed)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_etl_run(pool: &PgPool, id: i64) -> Result<EtlRunRow, DbError> {
    sqlx::query_as::<_, EtlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM etl_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_etl_runs(pool: &PgPool, limit: i64) -> Result<Vec<EtlRunRow>, DbError> {
    let rows = sqlx::query_as::<_, EtlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM etl_runs ORDER BY started_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
