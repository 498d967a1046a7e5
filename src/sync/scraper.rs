//! The interface to the bank and card scraper.
//!
//! Scraping itself happens in an external program. [CommandScraper] runs it as
//! `<program> <vendor> <start-date>` and reads a JSON array of transactions
//! from its standard output.

use std::{future::Future, path::PathBuf, pin::Pin, process::Stdio, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use time::{
    Date, OffsetDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};
use tokio::process::Command;

use crate::{
    Error,
    timezone::to_local_date,
    transaction::{Transaction, TransactionBuilder},
};

const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// What to scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRequest {
    /// The scraper vendor id, e.g. "isracard".
    pub vendor: String,
    /// The earliest transaction date to fetch.
    pub start_date: Date,
    /// How long the scrape may take.
    pub timeout: Duration,
    /// Whether the scraper should show its browser window.
    pub show_browser: bool,
}

/// Installment details of a split purchase.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrapedInstallments {
    /// Which installment this charge is.
    pub number: u32,
    /// How many installments there are in total.
    pub total: u32,
}

/// A transaction as reported by the scraper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedTransaction {
    /// ISO 8601 date or date-time of the transaction.
    pub date: String,
    /// ISO 8601 date or date-time the transaction was charged.
    #[serde(default)]
    pub processed_date: Option<String>,
    /// The statement description.
    pub description: String,
    /// The charged amount, negative for expenses.
    pub charged_amount: f64,
    /// The amount in the original currency.
    #[serde(default)]
    pub original_amount: Option<f64>,
    /// The original currency code.
    #[serde(default)]
    pub original_currency: Option<String>,
    /// Installment details, for split purchases.
    #[serde(default)]
    pub installments: Option<ScrapedInstallments>,
    /// Card digits, reported by card companies.
    #[serde(default)]
    pub card6_digits: Option<String>,
    /// Account number, reported by banks.
    #[serde(default)]
    pub account_number: Option<String>,
    /// A category suggested by the card company.
    #[serde(default)]
    pub category: Option<String>,
    /// The vendor's id for the transaction, a number or a string.
    #[serde(default)]
    pub identifier: Option<Value>,
}

impl ScrapedTransaction {
    /// Convert into a transaction builder for `vendor`.
    ///
    /// Date-times are dated in `local_timezone`.
    ///
    /// # Errors
    /// Returns [Error::ScraperFailed] if a date cannot be parsed.
    pub fn into_builder(
        self,
        vendor: &str,
        local_timezone: &str,
    ) -> Result<TransactionBuilder, Error> {
        let date = parse_scraped_date(&self.date, local_timezone, vendor)?;
        let processed_date = self
            .processed_date
            .as_deref()
            .map(|date| parse_scraped_date(date, local_timezone, vendor))
            .transpose()?;
        let source_id = self.identifier.and_then(|identifier| match identifier {
            Value::Null => None,
            Value::String(identifier) if identifier.is_empty() => None,
            Value::String(identifier) => Some(identifier),
            identifier => Some(identifier.to_string()),
        });

        Ok(
            Transaction::build(self.charged_amount, date, self.description.trim(), vendor)
                .processed_date(processed_date)
                .card6_digits(self.card6_digits.as_deref())
                .account_number(self.account_number.as_deref())
                .installments(
                    self.installments
                        .map(|installments| (installments.number, installments.total)),
                )
                .original(
                    self.original_amount
                        .zip(self.original_currency.as_deref()),
                )
                .category(self.category.as_deref().filter(|category| !category.is_empty()))
                .source_id(source_id.as_deref()),
        )
    }
}

/// Parse an ISO 8601 date, or the local date of an RFC 3339 date-time.
fn parse_scraped_date(text: &str, local_timezone: &str, vendor: &str) -> Result<Date, Error> {
    let invalid_date = |error: &dyn std::fmt::Display| Error::ScraperFailed {
        vendor: vendor.to_owned(),
        reason: format!("invalid date {text:?}: {error}"),
    };

    if !text.contains('T') {
        return Date::parse(text, DATE_FORMAT).map_err(|error| invalid_date(&error));
    }

    let datetime = OffsetDateTime::parse(text, &Rfc3339).map_err(|error| invalid_date(&error))?;

    to_local_date(datetime, local_timezone)
}

/// The future returned by [Scraper::scrape].
pub type ScrapeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<ScrapedTransaction>, Error>> + Send + 'a>>;

/// Fetches transactions from a bank or card company.
pub trait Scraper: Send + Sync {
    /// Fetch the transactions described by `request`.
    fn scrape<'a>(&'a self, request: &'a ScrapeRequest) -> ScrapeFuture<'a>;
}

/// Runs an external scraper program.
#[derive(Debug, Clone)]
pub struct CommandScraper {
    program: PathBuf,
}

impl CommandScraper {
    /// Create a scraper that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Scraper for CommandScraper {
    fn scrape<'a>(&'a self, request: &'a ScrapeRequest) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let start_date =
                request
                    .start_date
                    .format(DATE_FORMAT)
                    .map_err(|error| Error::ScraperFailed {
                        vendor: request.vendor.clone(),
                        reason: error.to_string(),
                    })?;

            let mut command = Command::new(&self.program);
            command
                .arg(&request.vendor)
                .arg(&start_date)
                .env("SHOW_BROWSER", if request.show_browser { "1" } else { "0" })
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            tracing::info!(
                "running scraper {} for {} since {start_date}",
                self.program.display(),
                request.vendor
            );

            let output = tokio::time::timeout(request.timeout, command.output())
                .await
                .map_err(|_| Error::ScraperTimeout(request.vendor.clone()))?
                .map_err(|error| Error::ScraperFailed {
                    vendor: request.vendor.clone(),
                    reason: format!("could not run {}: {error}", self.program.display()),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = stderr
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("exited with {}", output.status));

                return Err(Error::ScraperFailed {
                    vendor: request.vendor.clone(),
                    reason,
                });
            }

            serde_json::from_slice(&output.stdout).map_err(|error| Error::ScraperFailed {
                vendor: request.vendor.clone(),
                reason: format!("invalid scraper output: {error}"),
            })
        })
    }
}
