//! Full-catalog harvest: categories fan out to pages, pages persist their own
//! items, and every failed unit lands in the failure ledger.

use std::sync::Arc;
use std::time::Duration;

use gondola_core::{AppConfig, FailureKind, RetryToken};
use gondola_scraper::{PageFetch, PageFetcher};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::error::{Failure, HarvestError};
use crate::ledger::FailureLedger;
use crate::pool::{catch_panics, run_bounded};

/// Concurrency caps and pagination guards for a [`Harvester`].
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub category_concurrency: usize,
    /// Cap on page units in flight per category; nested inside the category cap.
    pub page_concurrency: usize,
    pub retry_concurrency: usize,
    pub total_count_poll_attempts: u32,
    pub total_count_poll_interval: Duration,
    pub max_pages_per_category: u32,
}

impl HarvestSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            category_concurrency: config.category_concurrency,
            page_concurrency: config.page_concurrency,
            retry_concurrency: config.retry_concurrency,
            total_count_poll_attempts: config.total_count_poll_attempts,
            total_count_poll_interval: Duration::from_millis(config.total_count_poll_interval_ms),
            max_pages_per_category: config.max_pages_per_category,
        }
    }
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            category_concurrency: 2,
            page_concurrency: 5,
            retry_concurrency: 10,
            total_count_poll_attempts: 10,
            total_count_poll_interval: Duration::from_secs(1),
            max_pages_per_category: 500,
        }
    }
}

/// Counters for one [`Harvester::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub categories: usize,
    pub categories_empty: usize,
    pub categories_failed: usize,
    pub pages_attempted: usize,
    pub pages_failed: usize,
    pub items_seen: u64,
    pub items_inserted: u64,
    /// Units that never ran, or were interrupted, because the run was cancelled.
    pub units_skipped: usize,
}

impl RunSummary {
    fn merge(&mut self, other: &RunSummary) {
        self.categories += other.categories;
        self.categories_empty += other.categories_empty;
        self.categories_failed += other.categories_failed;
        self.pages_attempted += other.pages_attempted;
        self.pages_failed += other.pages_failed;
        self.items_seen += other.items_seen;
        self.items_inserted += other.items_inserted;
        self.units_skipped += other.units_skipped;
    }
}

/// What one successful page unit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageReport {
    pub items_seen: u64,
    pub items_inserted: u64,
}

/// Number of listing pages implied by `total_count` items served
/// `first_page_len` at a time, never below one.
#[must_use]
pub fn page_count(total_count: u64, first_page_len: usize) -> u64 {
    let per_page = u64::try_from(first_page_len).unwrap_or(u64::MAX).max(1);
    total_count.div_ceil(per_page).max(1)
}

/// Runs harvests against one page source and one store.
pub struct Harvester<F> {
    pub(crate) fetcher: Arc<F>,
    pub(crate) catalog: Catalog,
    pub(crate) ledger: FailureLedger,
    pub(crate) settings: HarvestSettings,
}

impl<F> Clone for Harvester<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            catalog: self.catalog.clone(),
            ledger: self.ledger.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<F: PageFetcher> Harvester<F> {
    #[must_use]
    pub fn new(fetcher: F, pool: SqlitePool, settings: HarvestSettings) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            catalog: Catalog::new(pool.clone()),
            ledger: FailureLedger::new(pool),
            settings,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Harvests every category in `categories`.
    ///
    /// Failed pages and categories are recorded in the ledger and do not fail
    /// the run. Pages persisted before a cancellation stay persisted.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Cancelled`] if `cancel` fired before the run
    /// finished; in-flight units are drained first.
    pub async fn run(
        &self,
        categories: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunSummary, HarvestError> {
        tracing::info!(
            categories = categories.len(),
            source = self.fetcher.name(),
            category_concurrency = self.settings.category_concurrency,
            page_concurrency = self.settings.page_concurrency,
            "starting harvest run"
        );

        let this = self.clone();
        let run_cancel = cancel.clone();
        let outcome = run_bounded(
            categories.to_vec(),
            self.settings.category_concurrency,
            cancel,
            move |category| {
                let this = this.clone();
                let cancel = run_cancel.clone();
                async move { this.harvest_category(category, &cancel).await }
            },
        )
        .await;

        let mut summary = RunSummary {
            units_skipped: outcome.skipped,
            ..RunSummary::default()
        };
        for result in outcome.results {
            match result {
                Ok(category_summary) => summary.merge(&category_summary),
                Err(e) => {
                    tracing::error!(error = %e, "category worker died");
                    summary.categories += 1;
                    summary.categories_failed += 1;
                }
            }
        }

        tracing::info!(
            categories = summary.categories,
            categories_empty = summary.categories_empty,
            categories_failed = summary.categories_failed,
            pages_attempted = summary.pages_attempted,
            pages_failed = summary.pages_failed,
            items_seen = summary.items_seen,
            items_inserted = summary.items_inserted,
            units_skipped = summary.units_skipped,
            "harvest run finished"
        );

        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        Ok(summary)
    }

    async fn harvest_category(&self, category: String, cancel: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary {
            categories: 1,
            pages_attempted: 1,
            ..RunSummary::default()
        };
        let first_token = self.fetcher.descriptor(&category, 1);

        let first = match catch_panics(self.first_page(&category, &first_token, cancel)).await {
            Ok(first) => first,
            Err(HarvestError::Cancelled) => {
                summary.units_skipped += 1;
                return summary;
            }
            Err(err) => {
                tracing::warn!(
                    category = %category,
                    token = %first_token,
                    error = %err,
                    "category page failed"
                );
                let failure = Failure::capture(FailureKind::CategoryPageFailed, &err);
                self.ledger.record(&failure, &first_token).await;
                summary.categories_failed += 1;
                summary.pages_failed += 1;
                return summary;
            }
        };

        if first.fetch.items.is_empty() {
            tracing::info!(category = %category, "category is empty");
            summary.categories_empty += 1;
            return summary;
        }
        summary.items_seen += first.report.items_seen;
        summary.items_inserted += first.report.items_inserted;

        let pages = self.pages_for(&category, &first.fetch);

        let this = self.clone();
        let page_cancel = cancel.clone();
        let unit_category = category.clone();
        let outcome = run_bounded(
            (2..=pages).collect::<Vec<u32>>(),
            self.settings.page_concurrency,
            cancel,
            move |page| {
                let this = this.clone();
                let cancel = page_cancel.clone();
                let token = this.fetcher.descriptor(&unit_category, page);
                async move {
                    this.harvest_page(&token, FailureKind::ProductPageFailed, &cancel)
                        .await
                }
            },
        )
        .await;

        summary.units_skipped += outcome.skipped;
        for result in outcome.results {
            match result.and_then(|r| r) {
                Ok(report) => {
                    summary.pages_attempted += 1;
                    summary.items_seen += report.items_seen;
                    summary.items_inserted += report.items_inserted;
                }
                Err(HarvestError::Cancelled) => summary.units_skipped += 1,
                Err(_) => {
                    summary.pages_attempted += 1;
                    summary.pages_failed += 1;
                }
            }
        }

        tracing::info!(
            category = %category,
            pages,
            pages_failed = summary.pages_failed,
            items_inserted = summary.items_inserted,
            "category harvested"
        );
        summary
    }

    /// Page count for a category whose first page is `first`, clamped to
    /// `max_pages_per_category`.
    pub(crate) fn pages_for(&self, category: &str, first: &PageFetch) -> u32 {
        let derived = page_count(first.total_count, first.items.len());
        let max_pages = self.settings.max_pages_per_category.max(1);
        let pages = u32::try_from(derived).unwrap_or(u32::MAX);
        let pages = if pages > max_pages {
            tracing::warn!(
                category,
                derived_pages = derived,
                max_pages,
                "page count exceeds ceiling; clamping"
            );
            max_pages
        } else {
            pages
        };
        tracing::debug!(
            category,
            total_count = first.total_count,
            first_page_items = first.items.len(),
            pages,
            "derived page count"
        );
        pages
    }

    /// Fetches and persists page 1 of `category`, polling until the declared
    /// total count is available.
    async fn first_page(
        &self,
        category: &str,
        token: &RetryToken,
        cancel: &CancellationToken,
    ) -> Result<FirstPage, HarvestError> {
        let fetch = self.fetch_with_total(category, token, cancel).await?;
        let report = self.save_page(&fetch, cancel).await?;
        Ok(FirstPage { fetch, report })
    }

    /// Fetches `token`; while the page has items but no declared total,
    /// refetches it up to `total_count_poll_attempts` times.
    pub(crate) async fn fetch_with_total(
        &self,
        category: &str,
        token: &RetryToken,
        cancel: &CancellationToken,
    ) -> Result<PageFetch, HarvestError> {
        let mut fetch = self.fetch_page(token, cancel).await?;
        let attempts = self.settings.total_count_poll_attempts;
        let mut attempt = 0;

        while !fetch.items.is_empty() && fetch.total_count == 0 {
            if attempt >= attempts {
                return Err(HarvestError::TotalCountUnavailable {
                    category: category.to_owned(),
                    attempts,
                });
            }
            attempt += 1;
            tracing::debug!(
                category,
                attempt,
                attempts,
                "total count not available yet; polling"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HarvestError::Cancelled),
                () = tokio::time::sleep(self.settings.total_count_poll_interval) => {}
            }
            fetch = self.fetch_page(token, cancel).await?;
        }

        Ok(fetch)
    }

    pub(crate) async fn fetch_page(
        &self,
        token: &RetryToken,
        cancel: &CancellationToken,
    ) -> Result<PageFetch, HarvestError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HarvestError::Cancelled),
            fetched = self.fetcher.fetch(token) => Ok(fetched?),
        }
    }

    async fn save_page(
        &self,
        fetch: &PageFetch,
        cancel: &CancellationToken,
    ) -> Result<PageReport, HarvestError> {
        let items_seen = u64::try_from(fetch.items.len()).unwrap_or(u64::MAX);
        if fetch.items.is_empty() {
            return Ok(PageReport::default());
        }
        let items_inserted = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HarvestError::Cancelled),
            saved = self.catalog.save(&fetch.items) => saved?,
        };
        Ok(PageReport {
            items_seen,
            items_inserted,
        })
    }

    /// One page unit: fetch, persist, and on failure record `kind` against
    /// `token`. Panics inside the unit are caught here and treated like any
    /// other failure. Cancellation is returned without being recorded.
    pub(crate) async fn harvest_page(
        &self,
        token: &RetryToken,
        kind: FailureKind,
        cancel: &CancellationToken,
    ) -> Result<PageReport, HarvestError> {
        let result = catch_panics(async {
            let fetch = self.fetch_page(token, cancel).await?;
            self.save_page(&fetch, cancel).await
        })
        .await;

        match result {
            Ok(report) => {
                tracing::debug!(
                    token = %token,
                    items = report.items_seen,
                    inserted = report.items_inserted,
                    "page harvested"
                );
                Ok(report)
            }
            Err(HarvestError::Cancelled) => Err(HarvestError::Cancelled),
            Err(err) => {
                tracing::warn!(token = %token, kind = %kind, error = %err, "page failed");
                let failure = Failure::capture(kind, &err);
                self.ledger.record(&failure, token).await;
                Err(err)
            }
        }
    }
}

struct FirstPage {
    fetch: PageFetch,
    report: PageReport,
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
