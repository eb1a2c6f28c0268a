//! Database operations for the `failures` ledger.

use chrono::{DateTime, Utc};
use gondola_core::{FailureKind, UnknownFailureKind};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::DbError;

/// A row from the `failures` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailureRow {
    pub id: String,
    /// Stored form of a [`FailureKind`]; see [`FailureRow::kind`].
    pub kind: String,
    pub message: String,
    pub stack_trace: Option<String>,
    /// JSON-encoded retry token describing the unit of work that failed.
    pub retry_token: String,
    pub captured_at: DateTime<Utc>,
    /// `NULL` while the failure is pending; set once a retry consumed it.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FailureRow {
    /// Decodes the stored `kind` column.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownFailureKind`] if the column holds an unrecognized value.
    pub fn kind(&self) -> Result<FailureKind, UnknownFailureKind> {
        self.kind.parse()
    }
}

/// Input for [`insert_failure`].
#[derive(Debug, Clone, Copy)]
pub struct NewFailure<'a> {
    pub kind: FailureKind,
    pub message: &'a str,
    pub stack_trace: Option<&'a str>,
    pub retry_token: &'a str,
}

/// Inserts a pending failure record and returns its generated id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_failure(pool: &SqlitePool, failure: &NewFailure<'_>) -> Result<String, DbError> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO failures (id, kind, message, stack_trace, retry_token, captured_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(failure.kind.as_str())
    .bind(failure.message)
    .bind(failure.stack_trace)
    .bind(failure.retry_token)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Returns pending (non-deleted) failures of `kind`, newest first.
///
/// Ordered by `captured_at DESC, rowid DESC` so records captured within the
/// same clock tick still come back in reverse insertion order. `limit` of
/// `None` returns every pending record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_failures_by_kind(
    pool: &SqlitePool,
    kind: FailureKind,
    limit: Option<i64>,
) -> Result<Vec<FailureRow>, DbError> {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.unwrap_or(-1);

    let rows = sqlx::query_as::<_, FailureRow>(
        "SELECT id, kind, message, stack_trace, retry_token, captured_at, deleted_at \
         FROM failures \
         WHERE kind = ? AND deleted_at IS NULL \
         ORDER BY captured_at DESC, rowid DESC \
         LIMIT ?",
    )
    .bind(kind.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Marks the given failures as consumed by setting `deleted_at`.
///
/// Already-deleted ids and unknown ids are ignored. Returns the number of rows
/// that transitioned from pending to deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn soft_delete_failures(pool: &SqlitePool, ids: &[String]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let deleted_at = Utc::now();
    let mut affected = 0_u64;
    for chunk in ids.chunks(crate::INSERT_BATCH_SIZE) {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE failures SET deleted_at = ");
        builder.push_bind(deleted_at);
        builder.push(" WHERE deleted_at IS NULL AND id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        affected += builder.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

/// Returns the number of pending failures of `kind`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_pending_failures(pool: &SqlitePool, kind: FailureKind) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM failures WHERE kind = ? AND deleted_at IS NULL",
    )
    .bind(kind.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count)
}
