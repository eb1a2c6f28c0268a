//! Durable record of failed units of work, consumed by the retry runner.

use std::time::Duration;

use gondola_core::{FailureKind, RetryToken};
use gondola_db::{FailureRow, NewFailure};
use sqlx::SqlitePool;

use crate::error::{Failure, HarvestError};

/// Upper bound on a single ledger write. The write runs on its own task so it
/// completes even when the caller is being torn down by cancellation.
const RECORD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FailureLedger {
    pool: SqlitePool,
}

impl FailureLedger {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records `failure` against the unit addressed by `token`.
    ///
    /// Best effort: a write that fails or times out is logged at `error` and
    /// otherwise ignored so it never masks the failure being recorded.
    /// Returns whether the record was persisted.
    pub async fn record(&self, failure: &Failure, token: &RetryToken) -> bool {
        let retry_token = match token.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(
                    kind = %failure.kind,
                    token = %token,
                    error = %e,
                    "failed to encode retry token; failure not recorded"
                );
                return false;
            }
        };

        let pool = self.pool.clone();
        let failure = failure.clone();
        let write = tokio::spawn(async move {
            let row = NewFailure {
                kind: failure.kind,
                message: &failure.message,
                stack_trace: failure.trace.as_deref(),
                retry_token: &retry_token,
            };
            tokio::time::timeout(RECORD_TIMEOUT, gondola_db::insert_failure(&pool, &row)).await
        });

        match write.await {
            Ok(Ok(Ok(id))) => {
                tracing::debug!(id = %id, token = %token, "recorded failure");
                true
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(token = %token, error = %e, "failed to record failure");
                false
            }
            Ok(Err(_)) => {
                tracing::error!(
                    token = %token,
                    timeout_secs = RECORD_TIMEOUT.as_secs(),
                    "timed out recording failure"
                );
                false
            }
            Err(e) => {
                tracing::error!(token = %token, error = %e, "failure recording task aborted");
                false
            }
        }
    }

    /// Pending (non-deleted) failures of `kind`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Db`] if the ledger cannot be read.
    pub async fn list_by_kind(
        &self,
        kind: FailureKind,
        limit: Option<i64>,
    ) -> Result<Vec<FailureRow>, HarvestError> {
        Ok(gondola_db::list_failures_by_kind(&self.pool, kind, limit).await?)
    }

    /// Soft-deletes the given failures. Unknown and already-deleted ids are
    /// ignored; an empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Db`] if the update fails.
    pub async fn delete(&self, ids: &[String]) -> Result<u64, HarvestError> {
        Ok(gondola_db::soft_delete_failures(&self.pool, ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gondola_core::TokenError;

    fn failure(kind: FailureKind) -> Failure {
        Failure::capture(
            kind,
            &HarvestError::Token(TokenError::MissingField("page")),
        )
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn recorded_failures_are_listed_with_their_token(pool: SqlitePool) {
        let ledger = FailureLedger::new(pool);
        let token = RetryToken::listing_page("bebidas", 2);

        assert!(ledger.record(&failure(FailureKind::ProductPageFailed), &token).await);

        let rows = ledger
            .list_by_kind(FailureKind::ProductPageFailed, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(RetryToken::decode(&rows[0].retry_token).unwrap(), token);
        assert!(rows[0].message.starts_with("undecodable retry token"));
        assert_eq!(rows[0].kind().unwrap(), FailureKind::ProductPageFailed);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_is_idempotent(pool: SqlitePool) {
        let ledger = FailureLedger::new(pool);
        let token = RetryToken::page_url("https://store.example.test/bebidas?page=2");
        ledger.record(&failure(FailureKind::CategoryPageFailed), &token).await;

        let ids: Vec<String> = ledger
            .list_by_kind(FailureKind::CategoryPageFailed, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ledger.delete(&ids).await.unwrap(), 1);
        assert_eq!(ledger.delete(&ids).await.unwrap(), 0);
        assert_eq!(ledger.delete(&[]).await.unwrap(), 0);
        assert!(ledger
            .list_by_kind(FailureKind::CategoryPageFailed, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn record_reports_failure_when_the_store_is_gone(pool: SqlitePool) {
        let ledger = FailureLedger::new(pool.clone());
        pool.close().await;

        let recorded = ledger
            .record(
                &failure(FailureKind::ProductPageFailed),
                &RetryToken::listing_page("bebidas", 3),
            )
            .await;
        assert!(!recorded);
    }
}
