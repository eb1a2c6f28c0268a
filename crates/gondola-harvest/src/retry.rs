//! Second chance for recorded failures.
//!
//! Every pending record of one kind is re-run through the page unit and then
//! soft-deleted, whatever the outcome. A page that fails again is recorded
//! afresh, so each recorded failure gets at most one automatic retry.

use gondola_core::{FailureKind, RetryToken};
use gondola_db::FailureRow;
use gondola_scraper::PageFetcher;
use tokio_util::sync::CancellationToken;

use crate::error::HarvestError;
use crate::orchestrator::Harvester;
use crate::pool::run_bounded;

/// Counters for one [`Harvester::retry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub loaded: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records whose token could not be decoded or cannot be fetched by this
    /// source; these are not re-recorded.
    pub invalid_tokens: usize,
    pub skipped: usize,
    pub deleted: u64,
    pub items_inserted: u64,
}

enum RetryOutcome {
    Succeeded { items_inserted: u64 },
    Failed,
    InvalidToken,
    Cancelled,
}

impl<F: PageFetcher> Harvester<F> {
    /// Retries every pending failure of `kind` with at most `concurrency`
    /// attempts in flight.
    ///
    /// # Errors
    ///
    /// - [`HarvestError::Db`] if the ledger cannot be read or the consumed
    ///   records cannot be deleted.
    /// - [`HarvestError::Cancelled`] if `cancel` fired during the retry.
    /// - [`HarvestError::UnitsFailed`] if any record failed again or carried
    ///   an undecodable token. Every record is still attempted and deleted.
    pub async fn retry(
        &self,
        kind: FailureKind,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<RetrySummary, HarvestError> {
        let records = self.ledger.list_by_kind(kind, None).await?;
        if records.is_empty() {
            tracing::info!(kind = %kind, "no pending failures to retry");
            return Ok(RetrySummary::default());
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        tracing::info!(kind = %kind, records = ids.len(), concurrency, "retrying failures");

        let mut summary = self.retry_records(kind, records, concurrency, cancel).await;

        summary.deleted = match self.ledger.delete(&ids).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(
                    kind = %kind,
                    records = ids.len(),
                    failed = summary.failed,
                    error = %e,
                    "failed to delete retried failures"
                );
                return Err(e);
            }
        };

        tracing::info!(
            kind = %kind,
            loaded = summary.loaded,
            succeeded = summary.succeeded,
            failed = summary.failed,
            invalid_tokens = summary.invalid_tokens,
            skipped = summary.skipped,
            deleted = summary.deleted,
            items_inserted = summary.items_inserted,
            "retry finished"
        );

        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        let failed = summary.failed + summary.invalid_tokens;
        if failed > 0 {
            return Err(HarvestError::UnitsFailed {
                kind,
                failed,
                total: summary.loaded,
            });
        }
        Ok(summary)
    }

    async fn retry_records(
        &self,
        kind: FailureKind,
        records: Vec<FailureRow>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> RetrySummary {
        let mut summary = RetrySummary {
            loaded: records.len(),
            ..RetrySummary::default()
        };

        let this = self.clone();
        let unit_cancel = cancel.clone();
        let outcome = run_bounded(records, concurrency, cancel, move |record: FailureRow| {
            let this = this.clone();
            let cancel = unit_cancel.clone();
            async move { this.retry_one(&record, kind, &cancel).await }
        })
        .await;

        summary.skipped += outcome.skipped;
        for result in outcome.results {
            match result {
                Ok(RetryOutcome::Succeeded { items_inserted }) => {
                    summary.succeeded += 1;
                    summary.items_inserted += items_inserted;
                }
                Ok(RetryOutcome::InvalidToken) => summary.invalid_tokens += 1,
                Ok(RetryOutcome::Cancelled) => summary.skipped += 1,
                Ok(RetryOutcome::Failed) | Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    async fn retry_one(
        &self,
        record: &FailureRow,
        kind: FailureKind,
        cancel: &CancellationToken,
    ) -> RetryOutcome {
        let token = match RetryToken::decode(&record.retry_token) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    retry_token = %record.retry_token,
                    error = %e,
                    "dropping failure with undecodable retry token"
                );
                return RetryOutcome::InvalidToken;
            }
        };
        if !self.fetcher.accepts(&token) {
            tracing::warn!(
                id = %record.id,
                token = %token,
                source = self.fetcher.name(),
                "dropping failure whose token this source cannot fetch"
            );
            return RetryOutcome::InvalidToken;
        }

        match self.harvest_page(&token, kind, cancel).await {
            Ok(report) => RetryOutcome::Succeeded {
                items_inserted: report.items_inserted,
            },
            Err(HarvestError::Cancelled) => RetryOutcome::Cancelled,
            Err(_) => RetryOutcome::Failed,
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
