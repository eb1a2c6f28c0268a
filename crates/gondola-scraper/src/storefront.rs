//! Storefront listing addresses and the DOM selectors used to read them.

use reqwest::Url;

pub const TOTAL_COUNT_SELECTOR: &str = "h2[data-testid='total-product-count']";
pub const CARD_SELECTOR: &str =
    "div[data-fs-product-listing-results='true'] section[data-testid='store-product-card-content']";
pub const NAME_SELECTOR: &str = "h3";
pub const BULK_PRICE_SELECTOR: &str = ".text-lg.text-neutral-500.font-bold";
pub const REGULAR_PRICE_SELECTOR: &str = ".flex.items-center.gap-1";

/// Address of page `page` of `category`: page 1 has no query string.
#[must_use]
pub fn listing_url(storefront_url: &str, category: &str, page: u32) -> String {
    let base = storefront_url.trim_end_matches('/');
    if page <= 1 {
        format!("{base}/{category}")
    } else {
        format!("{base}/{category}?page={page}")
    }
}

/// Recovers the category slug from a listing address (its last path segment).
#[must_use]
pub fn category_from_listing_url(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_has_no_query() {
        assert_eq!(
            listing_url("https://store.example.test/", "bebidas", 1),
            "https://store.example.test/bebidas"
        );
    }

    #[test]
    fn later_pages_use_page_param() {
        assert_eq!(
            listing_url("https://store.example.test", "bebidas", 3),
            "https://store.example.test/bebidas?page=3"
        );
    }

    #[test]
    fn category_is_last_path_segment() {
        assert_eq!(
            category_from_listing_url("https://store.example.test/higiene-e-perfumaria?page=4")
                .as_deref(),
            Some("higiene-e-perfumaria")
        );
        assert_eq!(
            category_from_listing_url("https://store.example.test/bebidas/").as_deref(),
            Some("bebidas")
        );
    }

    #[test]
    fn category_of_garbage_is_none() {
        assert_eq!(category_from_listing_url("not a url"), None);
        assert_eq!(category_from_listing_url("https://store.example.test/"), None);
    }
}
