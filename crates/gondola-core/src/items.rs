use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog entry harvested from one listing page.
///
/// Items carry no identity until they are persisted; `name` is the natural
/// key used for deduplication against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Highest of the price signals shown for the item, in currency units.
    pub price: Decimal,
    pub category: Option<String>,
    /// SKU or GTIN, when the source exposes one.
    pub code: Option<String>,
}

impl Item {
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
            category: None,
            code: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
