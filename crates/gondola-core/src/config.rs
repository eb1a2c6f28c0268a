use crate::app_config::{AppConfig, Environment, SourceKind};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    // Concurrency caps of zero would stall every pool, so they are rejected here.
    let parse_cap = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("GONDOLA_ENV", "development"));
    let log_level = or_default("GONDOLA_LOG_LEVEL", "info");
    let categories_path = PathBuf::from(or_default(
        "GONDOLA_CATEGORIES_PATH",
        "./config/categories.yaml",
    ));

    let source_raw = or_default("GONDOLA_SOURCE", "api");
    let source = parse_source(&source_raw).ok_or_else(|| {
        invalid(
            "GONDOLA_SOURCE",
            format!("expected `api` or `browser`, got `{source_raw}`"),
        )
    })?;

    let api_base_url = or_default(
        "GONDOLA_API_BASE_URL",
        "https://www.atacadao.com.br/api/graphql",
    );
    let api_page_size = parse_u32("GONDOLA_API_PAGE_SIZE", "100")?;
    if api_page_size == 0 {
        return Err(invalid(
            "GONDOLA_API_PAGE_SIZE",
            "must be at least 1".to_string(),
        ));
    }
    let api_region_id = or_default("GONDOLA_API_REGION_ID", "U1cjYXRhY2FkYW9icjMw");
    let api_seller = or_default("GONDOLA_API_SELLER", "atacadaobr30");
    let storefront_url = or_default("GONDOLA_STOREFRONT_URL", "https://www.atacadao.com.br");
    let cdp_url = or_default("GONDOLA_CDP_URL", "http://localhost:9222");

    let db_max_connections = parse_u32("GONDOLA_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("GONDOLA_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let request_timeout_secs = parse_u64("GONDOLA_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("GONDOLA_USER_AGENT", "gondola/0.1 (catalog-harvester)");
    let max_retries = parse_u32("GONDOLA_MAX_RETRIES", "3")?;
    let retry_backoff_base_secs = parse_u64("GONDOLA_RETRY_BACKOFF_BASE_SECS", "2")?;

    let category_concurrency = parse_cap("GONDOLA_CATEGORY_CONCURRENCY", "2")?;
    let page_concurrency = parse_cap("GONDOLA_PAGE_CONCURRENCY", "5")?;
    let retry_concurrency = parse_cap("GONDOLA_RETRY_CONCURRENCY", "10")?;

    let total_count_poll_attempts = parse_u32("GONDOLA_TOTAL_COUNT_POLL_ATTEMPTS", "10")?;
    let total_count_poll_interval_ms = parse_u64("GONDOLA_TOTAL_COUNT_POLL_INTERVAL_MS", "1000")?;
    let max_pages_per_category = parse_u32("GONDOLA_MAX_PAGES_PER_CATEGORY", "500")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        categories_path,
        source,
        api_base_url,
        api_page_size,
        api_region_id,
        api_seller,
        storefront_url,
        cdp_url,
        db_max_connections,
        db_acquire_timeout_secs,
        request_timeout_secs,
        user_agent,
        max_retries,
        retry_backoff_base_secs,
        category_concurrency,
        page_concurrency,
        retry_concurrency,
        total_count_poll_attempts,
        total_count_poll_interval_ms,
        max_pages_per_category,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_source(s: &str) -> Option<SourceKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "api" => Some(SourceKind::Api),
        "browser" => Some(SourceKind::Browser),
        _ => None,
    }
}
