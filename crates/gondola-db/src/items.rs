//! Database operations for the `items` table.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use gondola_core::Item;
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::DbError;

/// Maximum number of rows written by a single `INSERT` statement.
pub const INSERT_BATCH_SIZE: usize = 500;

/// A row from the `items` table.
///
/// `price` is stored as its decimal string representation; use
/// [`ItemRow::price`] to recover the exact value.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    pub name: String,
    pub price: String,
    pub category: Option<String>,
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ItemRow {
    /// Parses the stored price back into a [`Decimal`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidPrice`] if the column holds a non-decimal value.
    pub fn price(&self) -> Result<Decimal, DbError> {
        Decimal::from_str(&self.price).map_err(|_| DbError::InvalidPrice {
            id: self.id.clone(),
            value: self.price.clone(),
        })
    }
}

/// Returns the stored rows whose `name` is in `names`.
///
/// An empty `names` slice short-circuits without touching the database.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items_by_names(
    pool: &SqlitePool,
    names: &[String],
) -> Result<Vec<ItemRow>, DbError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows = Vec::with_capacity(names.len());
    // Chunked to stay well under SQLite's bound-parameter limit.
    for chunk in names.chunks(INSERT_BATCH_SIZE) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, price, category, code, created_at FROM items WHERE name IN (",
        );
        let mut separated = builder.separated(", ");
        for name in chunk {
            separated.push_bind(name.as_str());
        }
        separated.push_unseparated(")");

        let found = builder
            .build_query_as::<ItemRow>()
            .fetch_all(pool)
            .await?;
        rows.extend(found);
    }

    Ok(rows)
}

/// Inserts `items` in batches of [`INSERT_BATCH_SIZE`], assigning each a fresh
/// UUID.
///
/// Rows whose `name` already exists are skipped via `ON CONFLICT DO NOTHING`,
/// so a concurrent writer racing on the same name never fails the batch.
///
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any batch fails. Batches committed before the
/// failing one stay committed.
pub async fn insert_items(pool: &SqlitePool, items: &[Item]) -> Result<u64, DbError> {
    let mut inserted = 0_u64;

    for chunk in items.chunks(INSERT_BATCH_SIZE) {
        let created_at = Utc::now();
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO items (id, name, price, category, code, created_at) ",
        );
        builder.push_values(chunk, |mut row, item| {
            row.push_bind(Uuid::new_v4().to_string())
                .push_bind(item.name.as_str())
                .push_bind(item.price.to_string())
                .push_bind(item.category.as_deref())
                .push_bind(item.code.as_deref())
                .push_bind(created_at);
        });
        builder.push(" ON CONFLICT (name) DO NOTHING");

        let result = builder.build().execute(pool).await?;
        inserted += result.rows_affected();
        tracing::debug!(
            batch = chunk.len(),
            inserted = result.rows_affected(),
            "inserted item batch"
        );
    }

    Ok(inserted)
}

/// Returns the total number of stored items.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_items(pool: &SqlitePool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
