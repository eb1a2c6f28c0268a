//! Listing pages rendered by an already-running Chrome, driven over CDP.
//!
//! One `Browser` connection is shared by every worker. Each fetch opens its
//! own tab and closes it again whether or not extraction succeeded.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, Element, Page};
use futures::StreamExt;
use gondola_core::{AppConfig, Item, RetryToken};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::ScraperError;
use crate::parse::{parse_count, parse_price, select_price};
use crate::source::{PageFetch, PageFetcher};
use crate::storefront::{
    category_from_listing_url, listing_url, BULK_PRICE_SELECTOR, CARD_SELECTOR, NAME_SELECTOR,
    REGULAR_PRICE_SELECTOR, TOTAL_COUNT_SELECTOR,
};

const CARD_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct BrowserFetcherConfig {
    pub cdp_url: String,
    pub storefront_url: String,
    /// Bound on navigation plus waiting for product cards to render.
    pub timeout_secs: u64,
}

impl BrowserFetcherConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            cdp_url: config.cdp_url.clone(),
            storefront_url: config.storefront_url.clone(),
            timeout_secs: config.request_timeout_secs,
        }
    }
}

pub struct BrowserFetcher {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<()>,
    config: BrowserFetcherConfig,
}

impl BrowserFetcher {
    /// Connects to the Chrome instance listening at `cdp_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if the CDP endpoint is unreachable.
    pub async fn connect(config: BrowserFetcherConfig) -> Result<Self, ScraperError> {
        let (browser, mut handler) = Browser::connect(config.cdp_url.as_str()).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(cdp_url = %config.cdp_url, "connected to browser");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            config,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn fetch_url(
        &self,
        url: &str,
        category: Option<&str>,
    ) -> Result<PageFetch, ScraperError> {
        // The lock only covers tab creation; extraction runs concurrently.
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await?
        };

        let result = self.read_listing(&page, url, category).await;
        if let Err(e) = page.close().await {
            tracing::warn!(url, error = %e, "failed to close browser tab");
        }
        result
    }

    async fn read_listing(
        &self,
        page: &Page,
        url: &str,
        category: Option<&str>,
    ) -> Result<PageFetch, ScraperError> {
        match tokio::time::timeout(self.timeout(), page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ScraperError::Browser(format!(
                    "navigation to {url} timed out after {}s",
                    self.config.timeout_secs
                )))
            }
        }

        let cards = self.wait_for_cards(page, url).await?;
        let mut items = Vec::with_capacity(cards.len());
        for card in &cards {
            if let Some(item) = read_card(card, category).await? {
                items.push(item);
            }
        }

        let total_count = read_total_count(page).await;
        tracing::debug!(
            url,
            items = items.len(),
            total_count,
            "read browser listing page"
        );

        Ok(PageFetch { items, total_count })
    }

    /// Polls until at least one product card is rendered, bounded by the
    /// configured timeout.
    async fn wait_for_cards(&self, page: &Page, url: &str) -> Result<Vec<Element>, ScraperError> {
        let deadline = tokio::time::Instant::now() + self.timeout();
        loop {
            if let Ok(cards) = page.find_elements(CARD_SELECTOR).await {
                if !cards.is_empty() {
                    return Ok(cards);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScraperError::NoListing {
                    url: url.to_owned(),
                    timeout_secs: self.config.timeout_secs,
                });
            }
            tokio::time::sleep(CARD_POLL_INTERVAL).await;
        }
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn element_text(element: &Element) -> Result<String, ScraperError> {
    Ok(element.inner_text().await?.unwrap_or_default().trim().to_owned())
}

/// Reads one product card. The bulk price is required; the regular price is
/// read only when the card renders one.
async fn read_card(card: &Element, category: Option<&str>) -> Result<Option<Item>, ScraperError> {
    let name = element_text(&card.find_element(NAME_SELECTOR).await?).await?;
    if name.is_empty() {
        tracing::debug!(?category, "skipping product card without a name");
        return Ok(None);
    }

    let bulk_text = element_text(&card.find_element(BULK_PRICE_SELECTOR).await?).await?;
    let bulk = parse_price(&bulk_text)?;

    let regular = match card.find_elements(REGULAR_PRICE_SELECTOR).await?.first() {
        Some(element) => Some(parse_price(&element_text(element).await?)?),
        None => None,
    };

    let price = select_price(Some(bulk), regular)
        .ok_or_else(|| ScraperError::MissingPrice { name: name.clone() })?;

    let mut item = Item::new(name, price);
    if let Some(category) = category {
        item = item.with_category(category);
    }
    Ok(Some(item))
}

/// Declared category size from the listing header; `0` while not rendered.
async fn read_total_count(page: &Page) -> u64 {
    let Ok(header) = page.find_element(TOTAL_COUNT_SELECTOR).await else {
        return 0;
    };
    match element_text(&header).await {
        Ok(text) => parse_count(&text).unwrap_or(0),
        Err(_) => 0,
    }
}

impl PageFetcher for BrowserFetcher {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn descriptor(&self, category: &str, page: u32) -> RetryToken {
        RetryToken::page_url(listing_url(&self.config.storefront_url, category, page))
    }

    fn accepts(&self, _token: &RetryToken) -> bool {
        true
    }

    async fn fetch(&self, token: &RetryToken) -> Result<PageFetch, ScraperError> {
        match token {
            RetryToken::PageUrl { page_url } => {
                let category = category_from_listing_url(page_url);
                self.fetch_url(page_url, category.as_deref()).await
            }
            RetryToken::ListingPage { category, page } => {
                let url = listing_url(&self.config.storefront_url, category, *page);
                self.fetch_url(&url, Some(category)).await
            }
        }
    }
}
