//! Resilient catalog harvesting: bounded fan-out over categories and pages,
//! deduplicating persistence, and a failure ledger that drives retries.

pub mod bulk;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod orchestrator;
mod pool;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use bulk::ListingSummary;
pub use catalog::Catalog;
pub use error::{error_chain, Failure, HarvestError};
pub use ledger::FailureLedger;
pub use orchestrator::{page_count, HarvestSettings, Harvester, PageReport, RunSummary};
pub use retry::RetrySummary;
