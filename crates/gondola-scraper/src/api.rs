//! Catalog client for the storefront's GraphQL search endpoint.
//!
//! Each request asks for one window of `page_size` products of a category,
//! addressed by offset (`after = (page - 1) * page_size`).

use std::time::Duration;

use gondola_core::{AppConfig, Item, RetryToken};
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;
use crate::rate_limit::retry_with_backoff;
use crate::source::{PageFetch, PageFetcher};

const OPERATION_NAME: &str = "ProductsQuery";
const SORT: &str = "score_desc";
const SALES_CHANNEL: &str = "1";
const LOCALE: &str = "pt-BR";
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ApiFetcherConfig {
    pub base_url: String,
    pub page_size: u32,
    pub region_id: String,
    pub seller: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Additional attempts after the first failure for 429s and network errors.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl ApiFetcherConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            page_size: config.api_page_size,
            region_id: config.api_region_id.clone(),
            seller: config.api_seller.clone(),
            timeout_secs: config.request_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            backoff_base_secs: config.retry_backoff_base_secs,
        }
    }
}

/// HTTP page fetcher backed by the storefront search API.
///
/// One `reqwest::Client` is shared by every worker; requests carry no
/// per-page state beyond their query string.
pub struct ApiFetcher {
    client: Client,
    base_url: Url,
    config: ApiFetcherConfig,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SelectedFacet<'a> {
    key: &'a str,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Channel<'a> {
    sales_channel: &'a str,
    seller: &'a str,
    region_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    first: u32,
    after: String,
    sort: &'a str,
    term: &'a str,
    selected_facets: Vec<SelectedFacet<'a>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: Search,
}

#[derive(Debug, Deserialize)]
struct Search {
    products: ProductConnection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductConnection {
    #[serde(default)]
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: ProductNode,
}

#[derive(Debug, Deserialize)]
struct ProductNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    gtin: Option<String>,
    #[serde(default)]
    offers: Offers,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Offers {
    #[serde(default)]
    high_price: f64,
    #[serde(default)]
    low_price: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl ApiFetcher {
    /// Builds the fetcher with the configured timeout, `User-Agent`, and retry
    /// policy.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::InvalidBaseUrl`] if `base_url` does not parse or the
    ///   page size is zero.
    /// - [`ScraperError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(config: ApiFetcherConfig) -> Result<Self, ScraperError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ScraperError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if config.page_size == 0 {
            return Err(ScraperError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "page size must be at least 1".to_owned(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// JSON `variables` parameter for page `page` of `category`.
    fn variables_json(&self, category: &str, page: u32) -> Result<String, ScraperError> {
        let page = page.max(1);
        let channel = Channel {
            sales_channel: SALES_CHANNEL,
            seller: &self.config.seller,
            region_id: &self.config.region_id,
        };
        let channel = serde_json::to_string(&channel).map_err(|e| ScraperError::Deserialize {
            context: "channel facet".to_owned(),
            source: e,
        })?;

        let offset = u64::from(page - 1) * u64::from(self.config.page_size);
        let variables = Variables {
            first: self.config.page_size,
            after: offset.to_string(),
            sort: SORT,
            term: "",
            selected_facets: vec![
                SelectedFacet {
                    key: "category-1",
                    value: category.to_owned(),
                },
                SelectedFacet {
                    key: "region-id",
                    value: self.config.region_id.clone(),
                },
                SelectedFacet {
                    key: "channel",
                    value: channel,
                },
                SelectedFacet {
                    key: "locale",
                    value: LOCALE.to_owned(),
                },
            ],
        };

        serde_json::to_string(&variables).map_err(|e| ScraperError::Deserialize {
            context: format!("query variables for {category} page {page}"),
            source: e,
        })
    }

    fn request_url(&self, category: &str, page: u32) -> Result<Url, ScraperError> {
        let variables = self.variables_json(category, page)?;
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("operationName", OPERATION_NAME)
            .append_pair("variables", &variables);
        Ok(url)
    }

    /// Fetches one page of `category`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`]: HTTP 429 after all retries exhausted.
    /// - [`ScraperError::NotFound`]: HTTP 404 (not retried).
    /// - [`ScraperError::UnexpectedStatus`]: any other non-2xx status (not retried).
    /// - [`ScraperError::Http`]: network or TLS failure after all retries exhausted.
    /// - [`ScraperError::Deserialize`]: body does not match the search shape.
    /// - [`ScraperError::InvalidPrice`]: an offer price is not a finite number.
    pub async fn fetch_listing(&self, category: &str, page: u32) -> Result<PageFetch, ScraperError> {
        let url = self.request_url(category, page)?;
        let domain = self.base_url.host_str().unwrap_or_default().to_owned();

        let body = retry_with_backoff(self.config.max_retries, self.config.backoff_base_secs, || {
            let url = url.clone();
            let domain = domain.clone();
            async move {
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(ScraperError::RateLimited {
                        domain,
                        retry_after_secs,
                    });
                }

                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(ScraperError::NotFound {
                        url: url.to_string(),
                    });
                }

                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }

                Ok(response.text().await?)
            }
        })
        .await?;

        let parsed = serde_json::from_str::<SearchResponse>(&body).map_err(|e| {
            ScraperError::Deserialize {
                context: format!("search results for {category} page {page}"),
                source: e,
            }
        })?;

        let connection = parsed.data.search.products;
        let mut items = Vec::with_capacity(connection.edges.len());
        for edge in connection.edges {
            if let Some(item) = node_to_item(edge.node, category)? {
                items.push(item);
            }
        }

        tracing::debug!(
            category,
            page,
            items = items.len(),
            total_count = connection.page_info.total_count,
            "fetched api listing page"
        );

        Ok(PageFetch {
            items,
            total_count: connection.page_info.total_count,
        })
    }
}

/// Converts one search node into an [`Item`]. Nameless nodes are skipped.
fn node_to_item(node: ProductNode, category: &str) -> Result<Option<Item>, ScraperError> {
    let name = node.name.trim();
    if name.is_empty() {
        tracing::debug!(category, "skipping product node without a name");
        return Ok(None);
    }

    let raw = node.offers.high_price.max(node.offers.low_price);
    let price = Decimal::try_from(raw)
        .map_err(|e| ScraperError::InvalidPrice {
            name: name.to_owned(),
            reason: e.to_string(),
        })?
        .round_dp(2);

    let code = [node.sku, node.gtin]
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_owned())
        .find(|c| !c.is_empty());

    let mut item = Item::new(name, price).with_category(category);
    if let Some(code) = code {
        item = item.with_code(code);
    }
    Ok(Some(item))
}

impl PageFetcher for ApiFetcher {
    fn name(&self) -> &'static str {
        "api"
    }

    fn descriptor(&self, category: &str, page: u32) -> RetryToken {
        RetryToken::listing_page(category, page)
    }

    fn accepts(&self, token: &RetryToken) -> bool {
        matches!(token, RetryToken::ListingPage { .. })
    }

    async fn fetch(&self, token: &RetryToken) -> Result<PageFetch, ScraperError> {
        match token {
            RetryToken::ListingPage { category, page } => self.fetch_listing(category, *page).await,
            RetryToken::PageUrl { .. } => Err(ScraperError::UnsupportedToken {
                fetcher: "api",
                token: token.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
