use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    card::db::{OwnershipId, get_cards, link_bank_account, upsert_card_ownership},
    events::{AppEvent, EventBus},
};

/// The state needed for the card routes.
#[derive(Debug, Clone)]
pub struct CardState {
    /// The database connection for managing cards.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Notifies clients that card metadata changed.
    pub events: EventBus,
}

impl FromRef<AppState> for CardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
        }
    }
}

/// The body for saving a card's nickname.
#[derive(Debug, Clone, Deserialize)]
pub struct CardForm {
    /// The scraper vendor id.
    pub vendor: String,
    /// The trailing four digits.
    pub last4: String,
    /// The nickname, or none to clear it.
    #[serde(default)]
    pub nickname: Option<String>,
}

/// The body for relinking a card. A missing or null account unlinks the card.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnershipForm {
    /// The bank account the card is charged to.
    #[serde(default)]
    pub linked_bank_account: Option<String>,
}

/// A route handler for listing cards.
pub async fn get_cards_endpoint(State(state): State<CardState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_cards(&connection) {
        Ok(cards) => Json(cards).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for saving a card's ownership record.
pub async fn upsert_card_endpoint(
    State(state): State<CardState>,
    Json(form): Json<CardForm>,
) -> Response {
    let vendor = form.vendor.trim();
    let last4 = form.last4.trim();
    if vendor.is_empty() || last4.is_empty() {
        return Error::InvalidCard("vendor and last4 are required".to_owned()).into_response();
    }
    let nickname = form
        .nickname
        .as_deref()
        .map(str::trim)
        .filter(|nickname| !nickname.is_empty());

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match upsert_card_ownership(vendor, last4, nickname, &connection) {
        Ok(ownership) => {
            state.events.publish(AppEvent::CardVendorsUpdated);
            Json(ownership).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler for linking a card to a bank account.
pub async fn update_card_ownership_endpoint(
    Path(ownership_id): Path<OwnershipId>,
    State(state): State<CardState>,
    Json(form): Json<OwnershipForm>,
) -> Response {
    let linked_bank_account = form
        .linked_bank_account
        .as_deref()
        .map(str::trim)
        .filter(|account| !account.is_empty());

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match link_bank_account(ownership_id, linked_bank_account, &connection) {
        Ok(ownership) => {
            tracing::info!(
                "card {} {} linked to {:?}",
                ownership.vendor,
                ownership.last4,
                ownership.linked_bank_account
            );
            state.events.publish(AppEvent::CardVendorsUpdated);
            Json(ownership).into_response()
        }
        Err(error) => error.into_response(),
    }
}
