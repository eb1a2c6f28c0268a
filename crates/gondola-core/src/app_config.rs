use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which backend a run pulls listing pages from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The storefront's internal GraphQL search endpoint.
    Api,
    /// A real Chrome session driven over the DevTools protocol.
    Browser,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Api => write!(f, "api"),
            SourceKind::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub categories_path: PathBuf,
    pub source: SourceKind,
    pub api_base_url: String,
    pub api_page_size: u32,
    pub api_region_id: String,
    pub api_seller: String,
    pub storefront_url: String,
    pub cdp_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_secs: u64,
    pub category_concurrency: usize,
    pub page_concurrency: usize,
    pub retry_concurrency: usize,
    pub total_count_poll_attempts: u32,
    pub total_count_poll_interval_ms: u64,
    pub max_pages_per_category: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("categories_path", &self.categories_path)
            .field("database_url", &"[redacted]")
            .field("source", &self.source)
            .field("api_base_url", &self.api_base_url)
            .field("api_page_size", &self.api_page_size)
            .field("api_region_id", &self.api_region_id)
            .field("api_seller", &self.api_seller)
            .field("storefront_url", &self.storefront_url)
            .field("cdp_url", &self.cdp_url)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_secs", &self.retry_backoff_base_secs)
            .field("category_concurrency", &self.category_concurrency)
            .field("page_concurrency", &self.page_concurrency)
            .field("retry_concurrency", &self.retry_concurrency)
            .field(
                "total_count_poll_attempts",
                &self.total_count_poll_attempts,
            )
            .field(
                "total_count_poll_interval_ms",
                &self.total_count_poll_interval_ms,
            )
            .field("max_pages_per_category", &self.max_pages_per_category)
            .finish()
    }
}
