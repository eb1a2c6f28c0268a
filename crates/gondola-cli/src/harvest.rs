//! Handlers for the `run`, `retry`, and `failures` subcommands.
//!
//! The page source is picked once from `GONDOLA_SOURCE`; everything after that is
//! generic over the fetcher.

use anyhow::Context;
use gondola_core::{AppConfig, FailureKind, SourceKind};
use gondola_harvest::{FailureLedger, HarvestSettings, Harvester};
use gondola_scraper::{ApiFetcher, ApiFetcherConfig, PageFetcher};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Save each page as soon as it is fetched.
    Paged,
    /// Collect every page, then save once.
    Bulk,
}

/// Work handed to a harvester once the page source is built.
#[derive(Debug)]
pub(crate) enum Job {
    Run { categories: Vec<String>, mode: Mode },
    Retry { kind: FailureKind, concurrency: usize },
}

/// Resolve which categories a run covers.
///
/// An empty `requested` list means every configured category. Requested slugs
/// must be configured.
///
/// # Errors
///
/// Returns an error if the categories file cannot be loaded or a requested
/// slug is not configured.
pub(crate) fn select_categories(
    config: &AppConfig,
    requested: &[String],
) -> anyhow::Result<Vec<String>> {
    let configured = gondola_core::load_categories(&config.categories_path)
        .with_context(|| {
            format!(
                "failed to load categories from {}",
                config.categories_path.display()
            )
        })?
        .categories;
    pick_categories(configured, requested)
}

pub(crate) fn pick_categories(
    configured: Vec<String>,
    requested: &[String],
) -> anyhow::Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(configured);
    }

    let mut selected: Vec<String> = Vec::with_capacity(requested.len());
    for slug in requested {
        let slug = slug.trim();
        if !configured.iter().any(|c| c == slug) {
            anyhow::bail!("category '{slug}' is not configured; add it to the categories file");
        }
        if !selected.iter().any(|s| s == slug) {
            selected.push(slug.to_owned());
        }
    }
    Ok(selected)
}

/// Build the configured page source and run `job` with it.
///
/// # Errors
///
/// Returns an error if the page source cannot be built, or the job's terminal
/// error.
pub(crate) async fn execute(
    config: &AppConfig,
    pool: SqlitePool,
    job: Job,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let settings = HarvestSettings::from_app_config(config);
    match config.source {
        SourceKind::Api => {
            let fetcher = ApiFetcher::new(ApiFetcherConfig::from_app_config(config))
                .context("failed to build the storefront API client")?;
            dispatch(Harvester::new(fetcher, pool, settings), job, cancel).await
        }
        #[cfg(feature = "browser")]
        SourceKind::Browser => {
            let fetcher = gondola_scraper::BrowserFetcher::connect(
                gondola_scraper::BrowserFetcherConfig::from_app_config(config),
            )
            .await
            .with_context(|| format!("failed to connect to the browser at {}", config.cdp_url))?;
            dispatch(Harvester::new(fetcher, pool, settings), job, cancel).await
        }
        #[cfg(not(feature = "browser"))]
        SourceKind::Browser => {
            anyhow::bail!("GONDOLA_SOURCE=browser needs a build with the `browser` feature enabled")
        }
    }
}

async fn dispatch<F: PageFetcher>(
    harvester: Harvester<F>,
    job: Job,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match job {
        Job::Run {
            categories,
            mode: Mode::Paged,
        } => {
            let summary = harvester.run(&categories, cancel).await?;
            println!(
                "harvested {} categories: {} pages, {} items seen, {} new",
                summary.categories, summary.pages_attempted, summary.items_seen, summary.items_inserted
            );
            if summary.pages_failed > 0 || summary.categories_failed > 0 {
                println!(
                    "{} categories and {} pages failed; see `gondola failures` and `gondola retry`",
                    summary.categories_failed, summary.pages_failed
                );
            }
        }
        Job::Run {
            categories,
            mode: Mode::Bulk,
        } => {
            let summary = harvester.collect_listing(&categories, cancel).await?;
            println!(
                "listed {} categories: {} pages, {} items seen, {} new",
                summary.categories, summary.pages, summary.items_seen, summary.items_inserted
            );
        }
        Job::Retry { kind, concurrency } => {
            let summary = harvester.retry(kind, concurrency, cancel).await?;
            if summary.loaded == 0 {
                println!("no pending {kind} failures");
            } else {
                println!(
                    "retried {} {kind} failures: {} succeeded, {} new items",
                    summary.loaded, summary.succeeded, summary.items_inserted
                );
            }
        }
    }
    Ok(())
}

/// Print pending failures of `kind`, newest first.
///
/// # Errors
///
/// Returns an error if the ledger cannot be read.
pub(crate) async fn print_failures(
    pool: SqlitePool,
    kind: FailureKind,
    limit: i64,
) -> anyhow::Result<()> {
    let ledger = FailureLedger::new(pool);
    let rows = ledger.list_by_kind(kind, Some(limit)).await?;

    if rows.is_empty() {
        println!("no pending {kind} failures");
        return Ok(());
    }

    println!("{:<38}{:<22}{:<36}MESSAGE", "ID", "CAPTURED", "TOKEN");
    for row in &rows {
        let message = row.message.lines().next().unwrap_or_default();
        let message = if message.chars().count() > 80 {
            format!("{}...", message.chars().take(77).collect::<String>())
        } else {
            message.to_owned()
        };
        println!(
            "{:<38}{:<22}{:<36}{}",
            row.id,
            row.captured_at.format("%Y-%m-%d %H:%M:%S"),
            row.retry_token,
            message
        );
    }
    Ok(())
}
