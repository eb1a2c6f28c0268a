//! Scripted page source for exercising the harvester without a network.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use gondola_core::{FailureKind, Item, RetryToken};
use gondola_db::FailureRow;
use gondola_scraper::{parse_price, PageFetch, PageFetcher, ScraperError};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use crate::orchestrator::HarvestSettings;

/// What one scripted fetch does.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Page { items: Vec<Item>, total: u64 },
    NotFound,
    /// Fails the way a card with unreadable price text does.
    BadPrice(&'static str),
    Panic,
    /// Never completes; only cancellation gets the unit out.
    Hang,
}

/// Pages are keyed by `(category, page)`. Each key plays its steps in order
/// and keeps repeating the last one. Unscripted pages fail with `NotFound`.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<(String, u32), VecDeque<Step>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn steps(self, category: &str, page: u32, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((category.to_owned(), page), steps.into());
        self
    }

    pub(crate) fn page(self, category: &str, page: u32, items: Vec<Item>, total: u64) -> Self {
        self.steps(category, page, vec![Step::Page { items, total }])
    }

    pub(crate) fn fails(self, category: &str, page: u32, step: Step) -> Self {
        self.steps(category, page, vec![step])
    }

    /// Pages of `category` that were fetched, in call order.
    pub(crate) fn pages_fetched(&self, category: &str) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == category)
            .map(|(_, p)| *p)
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_step(&self, category: &str, page: u32) -> Step {
        self.calls
            .lock()
            .unwrap()
            .push((category.to_owned(), page));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&(category.to_owned(), page)) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap(),
            None => Step::NotFound,
        }
    }
}

impl PageFetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn descriptor(&self, category: &str, page: u32) -> RetryToken {
        RetryToken::listing_page(category, page)
    }

    fn accepts(&self, token: &RetryToken) -> bool {
        matches!(token, RetryToken::ListingPage { .. })
    }

    async fn fetch(&self, token: &RetryToken) -> Result<PageFetch, ScraperError> {
        let RetryToken::ListingPage { category, page } = token else {
            return Err(ScraperError::UnsupportedToken {
                fetcher: "scripted",
                token: token.to_string(),
            });
        };

        match self.next_step(category, *page) {
            Step::Page { items, total } => Ok(PageFetch {
                items,
                total_count: total,
            }),
            Step::NotFound => Err(ScraperError::NotFound {
                url: token.to_string(),
            }),
            Step::BadPrice(text) => Err(parse_price(text).unwrap_err()),
            Step::Panic => panic!("scripted panic on {token}"),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// `range.len()` items of `category` with distinct names and prices.
pub(crate) fn items(category: &str, range: Range<i64>) -> Vec<Item> {
    range
        .map(|i| Item::new(format!("{category}-{i:04}"), Decimal::new(100 + i, 2)).with_category(category))
        .collect()
}

/// Settings with fast polling so tests never wait on real time.
pub(crate) fn settings() -> HarvestSettings {
    HarvestSettings {
        category_concurrency: 2,
        page_concurrency: 3,
        retry_concurrency: 4,
        total_count_poll_attempts: 2,
        total_count_poll_interval: Duration::from_millis(1),
        max_pages_per_category: 500,
    }
}

pub(crate) async fn pending(pool: &SqlitePool, kind: FailureKind) -> Vec<FailureRow> {
    gondola_db::list_failures_by_kind(pool, kind, None)
        .await
        .unwrap()
}

pub(crate) async fn stored_items(pool: &SqlitePool) -> i64 {
    gondola_db::count_items(pool).await.unwrap()
}
