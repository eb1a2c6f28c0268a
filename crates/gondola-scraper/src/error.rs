use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("no digits in numeric text {text:?}")]
    InvalidNumber { text: String },

    #[error("price for {name:?} is not representable: {reason}")]
    InvalidPrice { name: String, reason: String },

    #[error("no price signal found for {name:?}")]
    MissingPrice { name: String },

    #[error("token {token} is not supported by the {fetcher} fetcher")]
    UnsupportedToken {
        fetcher: &'static str,
        token: String,
    },

    #[error("no product cards rendered at {url} within {timeout_secs}s")]
    NoListing { url: String, timeout_secs: u64 },

    #[error("browser error: {0}")]
    Browser(String),
}

#[cfg(feature = "browser")]
impl From<chromiumoxide::error::CdpError> for ScraperError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}
