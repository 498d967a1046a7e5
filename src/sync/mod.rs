//! Fetching transactions from banks and card companies.
//!
//! A sync scrapes every configured vendor, imports the new transactions and
//! applies the description rules. Syncs run on demand or daily on a schedule.

mod endpoints;
mod runner;
mod scheduler;
mod scraper;

pub use endpoints::{
    RunningSync, SyncState, SyncStatus, get_background_sync_status_endpoint,
    start_background_sync_endpoint,
};
pub use runner::{SyncOptions, SyncReport, VendorSyncResult, run_sync};
pub use scheduler::spawn_scheduler;
pub use scraper::{CommandScraper, ScrapeFuture, ScrapeRequest, ScrapedTransaction, Scraper};
