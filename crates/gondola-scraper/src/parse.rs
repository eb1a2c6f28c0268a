//! Text helpers for turning storefront display strings into numbers.
//!
//! Storefront prices render as `"R$ 12,50"` and counts as `"1.234 produtos"`;
//! both are read by discarding every non-digit character. Prices are then
//! interpreted as integer cents.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ScraperError;

static NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9]+").expect("valid regex"));

fn digits_only(text: &str) -> Result<String, ScraperError> {
    let digits = NON_DIGITS.replace_all(text, "");
    if digits.is_empty() {
        return Err(ScraperError::InvalidNumber {
            text: text.to_owned(),
        });
    }
    Ok(digits.into_owned())
}

/// Parses display text into integer cents.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidNumber`] if the text carries no digits or the
/// digits overflow `i64`.
pub fn parse_cents(text: &str) -> Result<i64, ScraperError> {
    digits_only(text)?
        .parse::<i64>()
        .map_err(|_| ScraperError::InvalidNumber {
            text: text.to_owned(),
        })
}

/// Parses display text into an exact two-decimal price (`cents / 100`).
///
/// # Errors
///
/// See [`parse_cents`].
pub fn parse_price(text: &str) -> Result<Decimal, ScraperError> {
    Ok(Decimal::new(parse_cents(text)?, 2))
}

/// Parses a declared item count such as `"237 produtos"`.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidNumber`] if the text carries no digits or the
/// digits overflow `u64`.
pub fn parse_count(text: &str) -> Result<u64, ScraperError> {
    digits_only(text)?
        .parse::<u64>()
        .map_err(|_| ScraperError::InvalidNumber {
            text: text.to_owned(),
        })
}

/// Picks the effective price from the bulk and regular price signals.
///
/// The larger of the available signals wins; `None` only when neither is present.
#[must_use]
pub fn select_price(bulk: Option<Decimal>, regular: Option<Decimal>) -> Option<Decimal> {
    match (bulk, regular) {
        (Some(b), Some(r)) => Some(b.max(r)),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
