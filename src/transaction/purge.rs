//! Backing up and deleting every transaction.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::header,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    events::{AppEvent, EventBus},
    transaction::core::{Transaction, delete_all_transactions, get_all_transactions},
};

/// The text a user must type to delete every transaction.
pub const DELETE_CONFIRMATION: &str = "DELETE";

/// The filename suggested for the backup download.
const BACKUP_FILENAME: &str = "transactions-backup.csv";

/// The inputs of the "delete all transactions" dialog.
///
/// Deleting is allowed once the user typed [DELETE_CONFIRMATION] and, if they
/// asked for a backup, the backup has been downloaded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteAllGate {
    /// What the user typed in the confirmation box.
    pub confirm_text: String,
    /// Whether the user asked for a backup first.
    pub create_backup: bool,
    /// Whether the backup download finished.
    pub backup_downloaded: bool,
}

impl DeleteAllGate {
    /// Whether the delete button is enabled.
    pub fn can_delete(&self) -> bool {
        self.confirm_text == DELETE_CONFIRMATION && (!self.create_backup || self.backup_downloaded)
    }
}

/// The state needed for backing up and deleting transactions.
#[derive(Debug, Clone)]
pub struct PurgeState {
    /// The database connection for reading and deleting transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Notifies clients that every view is now empty.
    pub events: EventBus,
}

impl FromRef<AppState> for PurgeState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
        }
    }
}

/// The body of a delete all request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAllRequest {
    /// Must equal [DELETE_CONFIRMATION].
    #[serde(default)]
    pub confirmation: String,
}

/// How many transactions were deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    /// The number of deleted transactions.
    pub deleted: usize,
}

/// Write `transactions` as CSV with a header row.
///
/// # Errors
/// Returns [Error::CsvError] if a row cannot be serialized.
pub fn transactions_to_csv(transactions: &[Transaction]) -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for transaction in transactions {
        writer
            .serialize(transaction)
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))
}

/// A route handler that downloads every transaction as a CSV attachment.
pub async fn export_all_transactions_endpoint(State(state): State<PurgeState>) -> Response {
    let transactions = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        match get_all_transactions(&connection) {
            Ok(transactions) => transactions,
            Err(error) => return error.into_response(),
        }
    };

    match transactions_to_csv(&transactions) {
        Ok(body) => {
            tracing::info!("exported {} transactions", transactions.len());
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{BACKUP_FILENAME}\""),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler that deletes every transaction.
///
/// The request must carry the same confirmation text the dialog asks for.
pub async fn delete_all_transactions_endpoint(
    State(state): State<PurgeState>,
    Json(request): Json<DeleteAllRequest>,
) -> Response {
    if request.confirmation != DELETE_CONFIRMATION {
        return Error::InvalidConfirmation.into_response();
    }

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_all_transactions(&connection) {
        Ok(deleted) => {
            tracing::warn!("deleted all {deleted} transactions");
            state.events.publish(AppEvent::DataRefresh);
            Json(DeleteAllResponse { deleted }).into_response()
        }
        Err(error) => error.into_response(),
    }
}
