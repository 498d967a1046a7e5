//! Runs a sync: scrape every configured vendor and import the results.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    events::{AppEvent, EventBus},
    settings::Settings,
    sync::scraper::{ScrapeRequest, ScrapedTransaction, Scraper},
    transaction::{ImportSummary, import_transactions},
};

/// How much longer to wait before each further retry of a failed scrape.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// The parameters of one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// The vendors to scrape, in order.
    pub vendors: Vec<String>,
    /// How many days of history to fetch.
    pub days_back: u16,
    /// How long to wait between two vendors.
    pub delay: Duration,
    /// How long a single scrape may take.
    pub timeout: Duration,
    /// How many times to retry a failed scrape.
    pub retries: u32,
    /// Whether the scraper shows its browser.
    pub show_browser: bool,
    /// The canonical timezone scraped date-times are converted to.
    pub local_timezone: String,
}

impl SyncOptions {
    /// The sync options configured in `settings`, dating transactions in `local_timezone`.
    pub fn from_settings(settings: &Settings, local_timezone: &str) -> Self {
        Self {
            vendors: settings.sync_vendors.clone(),
            days_back: settings.sync_days_back,
            delay: Duration::from_secs(settings.scrape_delay_seconds),
            timeout: Duration::from_secs(settings.scraper_timeout_seconds),
            retries: settings.scraper_retries,
            show_browser: settings.show_browser,
            local_timezone: local_timezone.to_owned(),
        }
    }
}

/// How syncing one vendor went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSyncResult {
    /// The vendor id.
    pub vendor: String,
    /// How many scrape attempts were made.
    pub attempts: u32,
    /// What was imported, if the vendor succeeded.
    pub imported: Option<ImportSummary>,
    /// Why the vendor failed, if it did.
    pub error: Option<String>,
}

/// The result of a whole sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the run finished.
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// One entry per vendor, in the order they were synced.
    pub vendors: Vec<VendorSyncResult>,
}

impl SyncReport {
    /// The number of new transactions across all vendors.
    pub fn total_inserted(&self) -> usize {
        self.vendors
            .iter()
            .filter_map(|vendor| vendor.imported.as_ref())
            .map(|summary| summary.inserted)
            .sum()
    }
}

/// Scrape and import every vendor in `options`.
///
/// A vendor that fails after all retries is recorded in the report and the
/// run moves on to the next vendor. [AppEvent::DataRefresh] is published once
/// when the run ends.
pub async fn run_sync(
    scraper: &dyn Scraper,
    db_connection: &Arc<Mutex<Connection>>,
    events: &EventBus,
    options: &SyncOptions,
    today: Date,
) -> SyncReport {
    let started_at = OffsetDateTime::now_utc();
    let start_date = today
        .checked_sub(time::Duration::days(i64::from(options.days_back)))
        .unwrap_or(Date::MIN);
    let mut vendors = Vec::with_capacity(options.vendors.len());

    tracing::info!(
        "starting sync of {} vendors since {start_date}",
        options.vendors.len()
    );

    for (index, vendor) in options.vendors.iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            tracing::debug!("waiting {:?} before scraping {vendor}", options.delay);
            tokio::time::sleep(options.delay).await;
        }

        let request = ScrapeRequest {
            vendor: vendor.clone(),
            start_date,
            timeout: options.timeout,
            show_browser: options.show_browser,
        };

        let (attempts, scraped) = scrape_with_retries(scraper, &request, options.retries).await;
        let result = scraped.and_then(|scraped| {
            import_scraped(vendor, scraped, &options.local_timezone, db_connection)
        });

        match result {
            Ok(summary) => {
                tracing::info!(
                    "synced {vendor}: {} new, {} duplicates, {} categorized",
                    summary.inserted,
                    summary.duplicates,
                    summary.categorized
                );
                vendors.push(VendorSyncResult {
                    vendor: vendor.clone(),
                    attempts,
                    imported: Some(summary),
                    error: None,
                });
            }
            Err(error) => {
                tracing::error!("could not sync {vendor}: {error}");
                vendors.push(VendorSyncResult {
                    vendor: vendor.clone(),
                    attempts,
                    imported: None,
                    error: Some(error.to_string()),
                });
            }
        }
    }

    events.publish(AppEvent::DataRefresh);

    SyncReport {
        started_at,
        finished_at: OffsetDateTime::now_utc(),
        vendors,
    }
}

/// Scrape, retrying up to `retries` times and waiting a little longer after each failure.
async fn scrape_with_retries(
    scraper: &dyn Scraper,
    request: &ScrapeRequest,
    retries: u32,
) -> (u32, Result<Vec<ScrapedTransaction>, Error>) {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match scraper.scrape(request).await {
            Ok(scraped) => return (attempt, Ok(scraped)),
            Err(error) if attempt <= retries => {
                let backoff = RETRY_BACKOFF_STEP * attempt;
                tracing::warn!(
                    "scrape attempt {attempt} for {} failed, retrying in {backoff:?}: {error}",
                    request.vendor
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => return (attempt, Err(error)),
        }
    }
}

fn import_scraped(
    vendor: &str,
    scraped: Vec<ScrapedTransaction>,
    local_timezone: &str,
    db_connection: &Arc<Mutex<Connection>>,
) -> Result<ImportSummary, Error> {
    let builders = scraped
        .into_iter()
        .map(|transaction| transaction.into_builder(vendor, local_timezone))
        .collect::<Result<Vec<_>, _>>()?;

    let connection = db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    import_transactions(builders, &connection)
}
