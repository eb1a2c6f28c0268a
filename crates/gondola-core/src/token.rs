//! Retry tokens: the context persisted next to a failure so that exactly the
//! failed page can be fetched again later.
//!
//! Two shapes exist, one per page source:
//!
//! ```text
//! {"page_url": "https://store.example/bebidas?page=2"}   browser listings
//! {"category": "bebidas", "page": 2}                     API listings
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryToken {
    PageUrl { page_url: String },
    ListingPage { category: String, page: u32 },
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("retry token is not a JSON object: {0}")]
    Malformed(String),

    #[error("retry token is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("retry token field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("failed to encode retry token: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RetryToken {
    #[must_use]
    pub fn page_url(url: impl Into<String>) -> Self {
        RetryToken::PageUrl {
            page_url: url.into(),
        }
    }

    #[must_use]
    pub fn listing_page(category: impl Into<String>, page: u32) -> Self {
        RetryToken::ListingPage {
            category: category.into(),
            page,
        }
    }

    /// Serializes the token to the JSON blob stored in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, TokenError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored token, rejecting blobs that cannot address a page.
    ///
    /// A `page_url` key takes precedence over `category`/`page` when both are
    /// present.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Malformed`] if the blob is not a JSON object.
    /// - [`TokenError::MissingField`] if neither shape's required fields exist.
    /// - [`TokenError::InvalidField`] if a field is empty, mistyped, or `page`
    ///   is not a positive 32-bit integer.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(TokenError::Malformed(format!("expected object, got `{raw}`")));
        };

        if let Some(url) = fields.get("page_url") {
            let url = non_empty_str(url, "page_url")?;
            return Ok(RetryToken::page_url(url));
        }

        let category = fields
            .get("category")
            .ok_or(TokenError::MissingField("page_url"))?;
        let category = non_empty_str(category, "category")?;

        let page = fields.get("page").ok_or(TokenError::MissingField("page"))?;
        let page = page
            .as_u64()
            .and_then(|p| u32::try_from(p).ok())
            .filter(|p| *p >= 1)
            .ok_or_else(|| TokenError::InvalidField {
                field: "page",
                reason: format!("expected a positive integer, got {page}"),
            })?;

        Ok(RetryToken::listing_page(category, page))
    }
}

impl fmt::Display for RetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryToken::PageUrl { page_url } => f.write_str(page_url),
            RetryToken::ListingPage { category, page } => write!(f, "{category}#{page}"),
        }
    }
}

fn non_empty_str(value: &Value, field: &'static str) -> Result<String, TokenError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(TokenError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        }),
        other => Err(TokenError::InvalidField {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}
