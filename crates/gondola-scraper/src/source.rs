//! The page-fetching capability the harvest engine is generic over.

use std::future::Future;

use gondola_core::{Item, RetryToken};

use crate::error::ScraperError;

/// One fetched listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFetch {
    pub items: Vec<Item>,
    /// Item count the storefront declares for the whole category. `0` means
    /// the count was not available yet when the page was read.
    pub total_count: u64,
}

/// Fetches a single listing page of the catalog.
///
/// Implementations are shared across every worker of a run, so per-page state
/// (a browser tab, an in-flight request) must live inside `fetch`.
pub trait PageFetcher: Send + Sync + 'static {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Address of page `page` (1-based) of `category`. The returned token is
    /// what gets persisted when the page fails.
    fn descriptor(&self, category: &str, page: u32) -> RetryToken;

    /// Whether `fetch` can address `token` at all. Tokens recorded by another
    /// source may have a shape this one cannot follow.
    fn accepts(&self, token: &RetryToken) -> bool;

    /// Fetches the page addressed by `token`.
    fn fetch(
        &self,
        token: &RetryToken,
    ) -> impl Future<Output = Result<PageFetch, ScraperError>> + Send;
}
