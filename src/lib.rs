//! Moneyboard is a web service for tracking personal spending across credit
//! cards and bank accounts.
//!
//! This library provides a JSON REST API for budgets, reports, settings,
//! quick categorization, background syncing and WhatsApp summaries, plus the
//! client-side state types ("boards" and sessions) that a dashboard front end
//! drives.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::Serialize;
use tokio::signal;

mod app_state;
mod budget;
mod card;
mod categorize;
mod category;
mod currency;
mod db;
mod endpoints;
mod events;
mod logging;
mod pagination;
mod period;
mod report;
mod routing;
mod rule;
mod settings;
mod sync;
mod timezone;
mod transaction;
mod whatsapp;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use budget::{BudgetBoard, BudgetForm, BudgetWithSpending, join_budgets_with_spending};
pub use categorize::{TriageSession, TriageStep};
pub use db::initialize as initialize_db;
pub use events::{AppEvent, EventBus};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use pagination::PaginationConfig;
pub use period::Period;
pub use report::{BANK_VENDORS, ReportQuery};
pub use routing::build_router;
pub use settings::{
    AutoSaver, CommandInstaller, LibraryInstaller, SaveOutcome, Settings, SettingsSink,
};
pub use sync::{CommandScraper, ScrapedTransaction, Scraper, spawn_scheduler};
pub use timezone::get_local_offset;
pub use transaction::{
    DeleteAllGate, ImportSummary, Transaction, TransactionBuilder, import_transactions,
};
pub use whatsapp::{CommandBridge, WhatsAppBridge};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A budget limit that is not a finite, positive number.
    #[error("budget limit must be a positive number, got \"{0}\"")]
    InvalidBudgetLimit(String),

    /// An empty string was used as a category name.
    #[error("category cannot be empty")]
    EmptyCategory,

    /// An empty string was used as a transaction description.
    #[error("description cannot be empty")]
    EmptyDescription,

    /// A settings field is outside of its allowed range.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// A settings save was based on an older revision than the stored one.
    ///
    /// The client should reload the settings before saving again.
    #[error("settings revision {submitted} is not newer than the stored revision {stored}")]
    StaleSettingsRevision {
        /// The revision sent by the client.
        submitted: u64,
        /// The revision already in the database.
        stored: u64,
    },

    /// A card record is missing its vendor or last four digits.
    #[error("invalid card: {0}")]
    InvalidCard(String),

    /// A WhatsApp message is missing its recipient or text.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The confirmation text for a destructive action did not match.
    #[error("type DELETE to confirm")]
    InvalidConfirmation,

    /// The year, month or billing cycle day do not form a valid period.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// The specified import ID already exists in the database.
    ///
    /// Scraped transactions are identified by a hash of their content so that
    /// overlapping syncs do not import the same transaction twice.
    #[error("the import ID already exists in the database")]
    DuplicateImportId,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to delete a budget that does not exist
    #[error("tried to delete a budget that is not in the database")]
    DeleteMissingBudget,

    /// Tried to delete a rule that does not exist
    #[error("tried to delete a rule that is not in the database")]
    DeleteMissingRule,

    /// Tried to update a card ownership record that does not exist
    #[error("tried to update a card that is not in the database")]
    UpdateMissingCard,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Could not acquire the lock on the background sync status
    #[error("could not acquire the sync status lock")]
    SyncStatusLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing or deserializing JSON.
    #[error("could not convert JSON: {0}")]
    JSONSerializationError(String),

    /// The CSV backup could not be written.
    #[error("could not write CSV: {0}")]
    CsvError(String),

    /// A background sync was requested while another one is still running.
    #[error("a background sync is already running")]
    SyncAlreadyRunning,

    /// The scraper process failed or produced output that could not be parsed.
    #[error("scraper failed for {vendor}: {reason}")]
    ScraperFailed {
        /// The vendor that was being scraped.
        vendor: String,
        /// What went wrong.
        reason: String,
    },

    /// The scraper process did not finish within the configured timeout.
    #[error("scraper timed out for {0}")]
    ScraperTimeout(String),

    /// The WhatsApp channel is disabled or missing a recipient.
    #[error("WhatsApp is not configured: {0}")]
    WhatsAppNotConfigured(String),

    /// The WhatsApp bridge failed to deliver a message or pair a session.
    #[error("WhatsApp bridge error: {0}")]
    WhatsAppBridgeError(String),

    /// A scraper library version that is not `MAJOR.MINOR.PATCH[-PRERELEASE]`.
    #[error("invalid library version \"{0}\"")]
    InvalidLibraryVersion(String),

    /// The server was started without a library installer.
    #[error("the library updater is not configured")]
    LibraryUpdaterNotConfigured,

    /// A library update was requested while another one is still running.
    #[error("a library update is already running")]
    LibraryUpdateInProgress,

    /// The installer could not find or install the requested version.
    #[error("library update failed: {0}")]
    LibraryUpdateFailed(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

/// The JSON body sent to clients when a request fails.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidBudgetLimit(_)
            | Error::EmptyCategory
            | Error::EmptyDescription
            | Error::InvalidSetting(_)
            | Error::InvalidCard(_)
            | Error::InvalidMessage(_)
            | Error::InvalidConfirmation
            | Error::InvalidPeriod(_)
            | Error::InvalidLibraryVersion(_) => StatusCode::BAD_REQUEST,
            Error::NotFound
            | Error::DeleteMissingBudget
            | Error::DeleteMissingRule
            | Error::UpdateMissingCard => StatusCode::NOT_FOUND,
            Error::StaleSettingsRevision { .. }
            | Error::SyncAlreadyRunning
            | Error::LibraryUpdateInProgress
            | Error::DuplicateImportId => StatusCode::CONFLICT,
            Error::WhatsAppNotConfigured(_) | Error::LibraryUpdaterNotConfigured => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::ScraperFailed { .. }
            | Error::ScraperTimeout(_)
            | Error::WhatsAppBridgeError(_)
            | Error::LibraryUpdateFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal details are only meant for the server logs.
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
