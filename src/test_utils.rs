#![allow(missing_docs)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use rusqlite::Connection;
use time::Date;
use tokio::sync::mpsc;

use crate::{
    AppState, Error,
    db::initialize,
    pagination::PaginationConfig,
    settings::{InstallFuture, LibraryInstaller},
    sync::{ScrapeFuture, ScrapeRequest, ScrapedTransaction, Scraper},
    whatsapp::{BridgeConfig, BridgeEvent, BridgeFuture, Contact, ContactsFuture, WhatsAppBridge},
};

pub(crate) const TEST_TIMEZONE: &str = "Asia/Jerusalem";

#[track_caller]
pub(crate) fn get_test_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("could not open in-memory database");
    initialize(&connection).expect("could not initialize database");
    connection
}

pub(crate) fn get_test_state() -> AppState {
    build_state(
        Arc::new(FakeScraper::default()),
        Arc::new(FakeBridge::default()),
    )
}

pub(crate) fn get_test_state_with(scraper: Arc<dyn Scraper>) -> AppState {
    build_state(scraper, Arc::new(FakeBridge::default()))
}

pub(crate) fn get_test_state_with_bridge(bridge: Arc<dyn WhatsAppBridge>) -> AppState {
    build_state(Arc::new(FakeScraper::default()), bridge)
}

fn build_state(scraper: Arc<dyn Scraper>, bridge: Arc<dyn WhatsAppBridge>) -> AppState {
    let connection = Connection::open_in_memory().expect("could not open in-memory database");

    AppState::new(
        connection,
        TEST_TIMEZONE,
        PaginationConfig::default(),
        scraper,
        bridge,
    )
    .expect("could not create app state")
}

/// What a [FakeScraper] answers for one vendor.
#[derive(Debug, Clone)]
enum FakeResponse {
    Transactions(Vec<ScrapedTransaction>),
    Timeout,
    Failed(String),
    Panic,
}

/// A scraper with canned answers per vendor.
///
/// Each vendor's answers are used in order and the last one repeats. Vendors
/// without answers get no transactions.
#[derive(Debug, Default)]
pub(crate) struct FakeScraper {
    responses: HashMap<String, Vec<FakeResponse>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ScrapeRequest>>,
    served: Mutex<HashMap<String, usize>>,
}

impl FakeScraper {
    /// Answer `vendor` with `(date, description, amount)` rows.
    pub(crate) fn with_transactions(mut self, vendor: &str, rows: &[(&str, &str, f64)]) -> Self {
        let transactions = rows
            .iter()
            .map(|(date, description, amount)| ScrapedTransaction {
                date: date.to_string(),
                processed_date: None,
                description: description.to_string(),
                charged_amount: *amount,
                original_amount: None,
                original_currency: None,
                installments: None,
                card6_digits: Some("123456".to_owned()),
                account_number: None,
                category: None,
                identifier: None,
            })
            .collect();

        self.responses
            .entry(vendor.to_owned())
            .or_default()
            .push(FakeResponse::Transactions(transactions));
        self
    }

    /// Answer `vendor` with `error`.
    ///
    /// Errors other than scraper errors become a scraper failure with the error's message.
    pub(crate) fn with_error(mut self, vendor: &str, error: Error) -> Self {
        let response = match error {
            Error::ScraperTimeout(_) => FakeResponse::Timeout,
            Error::ScraperFailed { reason, .. } => FakeResponse::Failed(reason),
            error => FakeResponse::Failed(error.to_string()),
        };

        self.responses
            .entry(vendor.to_owned())
            .or_default()
            .push(response);
        self
    }

    /// Panic while scraping `vendor`.
    pub(crate) fn panicking(mut self, vendor: &str) -> Self {
        self.responses
            .entry(vendor.to_owned())
            .or_default()
            .push(FakeResponse::Panic);
        self
    }

    /// Wait `delay` before every answer.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The start dates of every scrape, in call order.
    pub(crate) fn requested_start_dates(&self) -> Vec<Date> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.start_date)
            .collect()
    }

    fn next_response(&self, vendor: &str) -> Option<FakeResponse> {
        let responses = self.responses.get(vendor)?;
        let mut served = self.served.lock().unwrap();
        let index = served.entry(vendor.to_owned()).or_default();
        let response = responses.get(*index).or(responses.last()).cloned();
        *index += 1;
        response
    }
}

impl Scraper for FakeScraper {
    fn scrape<'a>(&'a self, request: &'a ScrapeRequest) -> ScrapeFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match self.next_response(&request.vendor) {
                None => Ok(Vec::new()),
                Some(FakeResponse::Transactions(transactions)) => Ok(transactions),
                Some(FakeResponse::Timeout) => Err(Error::ScraperTimeout(request.vendor.clone())),
                Some(FakeResponse::Failed(reason)) => Err(Error::ScraperFailed {
                    vendor: request.vendor.clone(),
                    reason,
                }),
                Some(FakeResponse::Panic) => panic!("scraper crashed for {}", request.vendor),
            }
        })
    }
}

/// A WhatsApp bridge that records messages instead of sending them.
#[derive(Debug, Default)]
pub(crate) struct FakeBridge {
    events: Vec<BridgeEvent>,
    fail_sends: bool,
    sent: Mutex<Vec<(String, String)>>,
    pairings: Mutex<Vec<mpsc::UnboundedSender<BridgeEvent>>>,
    contacts: Vec<Contact>,
}

impl FakeBridge {
    /// Report `events` as soon as pairing starts.
    pub(crate) fn with_events(mut self, events: Vec<BridgeEvent>) -> Self {
        self.events = events;
        self
    }

    /// List `(name, number)` pairs as the paired account's contacts.
    pub(crate) fn with_contacts(mut self, contacts: &[(&str, &str)]) -> Self {
        self.contacts = contacts
            .iter()
            .map(|(name, number)| Contact {
                name: Some(name.to_string()),
                number: number.to_string(),
            })
            .collect();
        self
    }

    /// Make every send fail.
    pub(crate) fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// The `(to, message)` pairs sent so far.
    pub(crate) fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Report `event` from the `pairing`th pairing, counting from zero.
    pub(crate) fn emit(&self, pairing: usize, event: BridgeEvent) {
        let pairings = self.pairings.lock().unwrap();
        let _ = pairings[pairing].send(event);
    }
}

impl WhatsAppBridge for FakeBridge {
    fn connect<'a>(
        &'a self,
        _config: &'a BridgeConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> BridgeFuture<'a> {
        Box::pin(async move {
            for event in &self.events {
                let _ = events.send(event.clone());
            }
            self.pairings.lock().unwrap().push(events);
            Ok(())
        })
    }

    fn disconnect(&self) -> BridgeFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn send<'a>(
        &'a self,
        _config: &'a BridgeConfig,
        to: &'a str,
        message: &'a str,
    ) -> BridgeFuture<'a> {
        Box::pin(async move {
            if self.fail_sends {
                return Err(Error::WhatsAppBridgeError("phone is offline".to_owned()));
            }

            self.sent
                .lock()
                .unwrap()
                .push((to.to_owned(), message.to_owned()));
            Ok(())
        })
    }

    fn contacts<'a>(&'a self, _config: &'a BridgeConfig) -> ContactsFuture<'a> {
        Box::pin(async move { Ok(self.contacts.clone()) })
    }
}

/// A library installer that knows a fixed set of versions.
#[derive(Debug, Default)]
pub(crate) struct FakeInstaller {
    versions: Vec<String>,
    delay: Option<Duration>,
    installed: Mutex<Vec<String>>,
}

impl FakeInstaller {
    pub(crate) fn with_versions(versions: &[&str]) -> Self {
        Self {
            versions: versions.iter().map(|version| version.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Wait `delay` before every check.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn installed_versions(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }
}

impl LibraryInstaller for FakeInstaller {
    fn check<'a>(&'a self, version: &'a str) -> InstallFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.versions.iter().any(|known| known == version) {
                Ok(())
            } else {
                Err(Error::LibraryUpdateFailed(format!("no such version {version}")))
            }
        })
    }

    fn install<'a>(&'a self, version: &'a str) -> InstallFuture<'a> {
        Box::pin(async move {
            self.installed.lock().unwrap().push(version.to_owned());
            Ok(())
        })
    }
}
