use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to every recorded failure.
///
/// The string forms are what the ledger stores in `failures.kind`, so they
/// must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unknown,
    CategoryPageFailed,
    ProductPageFailed,
    ListingFailed,
    SavingFailed,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Unknown,
        FailureKind::CategoryPageFailed,
        FailureKind::ProductPageFailed,
        FailureKind::ListingFailed,
        FailureKind::SavingFailed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unknown => "unknown",
            FailureKind::CategoryPageFailed => "failed_processing_category_page",
            FailureKind::ProductPageFailed => "failed_processing_products_page",
            FailureKind::ListingFailed => "failed_listing_products",
            FailureKind::SavingFailed => "failed_saving_products",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown failure kind: {0}")]
pub struct UnknownFailureKind(pub String);

impl FromStr for FailureKind {
    type Err = UnknownFailureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownFailureKind(s.to_string()))
    }
}
