pub mod api;
#[cfg(feature = "browser")]
pub mod browser;
pub mod error;
pub mod parse;
mod rate_limit;
pub mod source;
pub mod storefront;

pub use api::{ApiFetcher, ApiFetcherConfig};
#[cfg(feature = "browser")]
pub use browser::{BrowserFetcher, BrowserFetcherConfig};
pub use error::ScraperError;
pub use parse::{parse_cents, parse_count, parse_price, select_price};
pub use source::{PageFetch, PageFetcher};
