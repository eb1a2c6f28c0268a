use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;

use gondola_core::{FailureKind, TokenError};
use gondola_db::DbError;
use gondola_scraper::ScraperError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Fetch(#[from] ScraperError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("undecodable retry token")]
    Token(#[from] TokenError),

    #[error("total item count for {category} still unavailable after {attempts} attempts")]
    TotalCountUnavailable { category: String, attempts: u32 },

    #[error("run cancelled")]
    Cancelled,

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("{failed} of {total} {kind} retries failed")]
    UnitsFailed {
        kind: FailureKind,
        failed: usize,
        total: usize,
    },
}

/// A unit-of-work failure as it is persisted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// The error and every `source()` beneath it, joined by `": "`.
    pub message: String,
    /// Captured only when `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` enable it.
    pub trace: Option<String>,
}

impl Failure {
    #[must_use]
    pub fn capture(kind: FailureKind, error: &(dyn StdError + 'static)) -> Self {
        let backtrace = Backtrace::capture();
        let trace = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            kind,
            message: error_chain(error),
            trace,
        }
    }
}

/// Renders `error` followed by its chain of sources.
#[must_use]
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
