//! Deduplicating write path for harvested items.

use std::collections::HashSet;

use gondola_core::Item;
use sqlx::SqlitePool;

use crate::error::HarvestError;

/// Persists items by name: an item whose name is already stored is skipped.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Saves the items whose names are not yet stored and returns how many
    /// rows were inserted.
    ///
    /// Within one call the first occurrence of a name wins. Names are checked
    /// against the store in one lookup, and the remainder is inserted in
    /// fixed-size batches. A concurrent writer inserting the same name between
    /// the lookup and the insert is absorbed by the store's uniqueness
    /// constraint.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Db`] if the lookup or any insert batch fails.
    pub async fn save(&self, items: &[Item]) -> Result<u64, HarvestError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
        let unique: Vec<&Item> = items
            .iter()
            .filter(|item| seen.insert(item.name.as_str()))
            .collect();
        if unique.len() < items.len() {
            tracing::debug!(
                duplicates = items.len() - unique.len(),
                "dropped duplicate names within one save"
            );
        }

        let names: Vec<String> = unique.iter().map(|item| item.name.clone()).collect();
        let existing: HashSet<String> = gondola_db::list_items_by_names(&self.pool, &names)
            .await?
            .into_iter()
            .map(|row| row.name)
            .collect();

        let fresh: Vec<Item> = unique
            .into_iter()
            .filter(|item| !existing.contains(&item.name))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let inserted = gondola_db::insert_items(&self.pool, &fresh).await?;
        tracing::debug!(
            candidates = items.len(),
            already_stored = existing.len(),
            inserted,
            "saved items"
        );
        Ok(inserted)
    }
}
