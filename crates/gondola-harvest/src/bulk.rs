//! List-then-save harvest: every page of every category is collected into
//! worker-local buffers, merged once all workers finish, and saved in one go.

use gondola_core::{FailureKind, Item, RetryToken};
use gondola_scraper::PageFetcher;
use tokio_util::sync::CancellationToken;

use crate::error::{Failure, HarvestError};
use crate::orchestrator::Harvester;
use crate::pool::{catch_panics, run_bounded};

/// Counters for one [`Harvester::collect_listing`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub categories: usize,
    pub pages: usize,
    pub items_seen: u64,
    pub items_inserted: u64,
}

/// Items read from one page, kept with the page's address.
struct PageBuffer {
    token: RetryToken,
    items: Vec<Item>,
}

/// The failure that aborted a listing, with the page it happened on when known.
struct ListingFailure {
    token: Option<RetryToken>,
    error: HarvestError,
}

impl ListingFailure {
    fn at(token: RetryToken, error: HarvestError) -> Self {
        Self {
            token: Some(token),
            error,
        }
    }
}

impl<F: PageFetcher> Harvester<F> {
    /// Lists every page of `categories` and then saves the merged listing.
    ///
    /// The first page that cannot be listed aborts the whole listing and is
    /// recorded as [`FailureKind::ListingFailed`]. If the final save fails,
    /// every listed page is recorded as [`FailureKind::SavingFailed`] so a
    /// retry refetches and saves exactly those pages.
    ///
    /// # Errors
    ///
    /// Returns the listing or saving error, or [`HarvestError::Cancelled`].
    pub async fn collect_listing(
        &self,
        categories: &[String],
        cancel: &CancellationToken,
    ) -> Result<ListingSummary, HarvestError> {
        tracing::info!(
            categories = categories.len(),
            source = self.fetcher.name(),
            "starting bulk listing"
        );

        // Cancelled by the first failing page so sibling workers stop early.
        let listing_cancel = cancel.child_token();
        let this = self.clone();
        let unit_cancel = listing_cancel.clone();
        let outcome = run_bounded(
            categories.to_vec(),
            self.settings.category_concurrency,
            &listing_cancel,
            move |category| {
                let this = this.clone();
                let cancel = unit_cancel.clone();
                async move { this.list_category(category, &cancel).await }
            },
        )
        .await;

        let mut buffers: Vec<PageBuffer> = Vec::new();
        let mut first_failure: Option<ListingFailure> = None;
        for result in outcome.results {
            let failure = match result {
                Ok(Ok(mut pages)) => {
                    buffers.append(&mut pages);
                    continue;
                }
                Ok(Err(failure)) => failure,
                Err(error) => ListingFailure { token: None, error },
            };
            if first_failure.is_none() && !matches!(failure.error, HarvestError::Cancelled) {
                first_failure = Some(failure);
            }
        }

        if let Some(failure) = first_failure {
            tracing::warn!(error = %failure.error, "listing aborted");
            if let Some(token) = &failure.token {
                let record = Failure::capture(FailureKind::ListingFailed, &failure.error);
                self.ledger.record(&record, token).await;
            }
            return Err(failure.error);
        }
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let items: Vec<Item> = buffers
            .iter()
            .flat_map(|buffer| buffer.items.iter().cloned())
            .collect();
        let mut summary = ListingSummary {
            categories: categories.len(),
            pages: buffers.len(),
            items_seen: u64::try_from(items.len()).unwrap_or(u64::MAX),
            items_inserted: 0,
        };

        let saved = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HarvestError::Cancelled),
            saved = self.catalog.save(&items) => saved,
        };
        match saved {
            Ok(inserted) => summary.items_inserted = inserted,
            Err(HarvestError::Cancelled) => return Err(HarvestError::Cancelled),
            Err(err) => {
                tracing::warn!(pages = buffers.len(), error = %err, "saving listing failed");
                let record = Failure::capture(FailureKind::SavingFailed, &err);
                for buffer in buffers.iter().filter(|b| !b.items.is_empty()) {
                    self.ledger.record(&record, &buffer.token).await;
                }
                return Err(err);
            }
        }

        tracing::info!(
            categories = summary.categories,
            pages = summary.pages,
            items_seen = summary.items_seen,
            items_inserted = summary.items_inserted,
            "bulk listing saved"
        );
        Ok(summary)
    }

    async fn list_category(
        &self,
        category: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageBuffer>, ListingFailure> {
        let first_token = self.fetcher.descriptor(&category, 1);
        let first = match catch_panics(self.fetch_with_total(&category, &first_token, cancel)).await
        {
            Ok(first) => first,
            Err(error) => {
                cancel.cancel();
                return Err(ListingFailure::at(first_token, error));
            }
        };
        if first.items.is_empty() {
            tracing::info!(category = %category, "category is empty");
            return Ok(Vec::new());
        }

        let pages = self.pages_for(&category, &first);
        let mut buffers = vec![PageBuffer {
            token: first_token,
            items: first.items,
        }];

        let this = self.clone();
        let page_cancel = cancel.clone();
        let outcome = run_bounded(
            (2..=pages).collect::<Vec<u32>>(),
            self.settings.page_concurrency,
            cancel,
            move |page| {
                let this = this.clone();
                let cancel = page_cancel.clone();
                let token = this.fetcher.descriptor(&category, page);
                async move {
                    match catch_panics(this.fetch_page(&token, &cancel)).await {
                        Ok(fetch) => Ok(PageBuffer {
                            token,
                            items: fetch.items,
                        }),
                        Err(error) => {
                            cancel.cancel();
                            Err(ListingFailure::at(token, error))
                        }
                    }
                }
            },
        )
        .await;

        let mut failure: Option<ListingFailure> = None;
        for result in outcome.results {
            match result {
                Ok(Ok(buffer)) => buffers.push(buffer),
                Ok(Err(f)) => {
                    // A real failure outranks the cancellations it triggered.
                    let replace = match &failure {
                        None => true,
                        Some(current) => matches!(current.error, HarvestError::Cancelled),
                    };
                    if replace {
                        failure = Some(f);
                    }
                }
                Err(error) => {
                    cancel.cancel();
                    if failure.is_none() {
                        failure = Some(ListingFailure { token: None, error });
                    }
                }
            }
        }

        match failure {
            Some(f) => Err(f),
            None if outcome.skipped > 0 => Err(ListingFailure {
                token: None,
                error: HarvestError::Cancelled,
            }),
            None => Ok(buffers),
        }
    }
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod tests;
