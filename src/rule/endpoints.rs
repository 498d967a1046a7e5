use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    events::{AppEvent, EventBus},
    rule::{
        apply::{RuleScope, apply_rules},
        db::{RuleId, delete_rule, get_all_rules},
    },
};

/// Unified state for all rule-related operations.
#[derive(Debug, Clone)]
pub struct RuleState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub events: EventBus,
}

impl FromRef<AppState> for RuleState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
        }
    }
}

/// A route handler for listing the description rules.
pub async fn get_rules_endpoint(State(state): State<RuleState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_rules(&connection) {
        Ok(rules) => Json(rules).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for deleting a rule.
pub async fn delete_rule_endpoint(
    Path(rule_id): Path<RuleId>,
    State(state): State<RuleState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_rule(rule_id, &connection) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(Error::DeleteMissingRule) => Error::DeleteMissingRule.into_response(),
        Err(error) => {
            tracing::error!("An unexpected error occurred while deleting rule {rule_id}: {error}");
            error.into_response()
        }
    }
}

/// A route handler for applying the rules to every uncategorized transaction.
pub async fn apply_rules_endpoint(State(state): State<RuleState>) -> Response {
    let start_time = std::time::Instant::now();

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match apply_rules(RuleScope::AllUncategorized, &connection) {
        Ok(result) => {
            tracing::info!(
                "Applying rules completed in {:.2}ms: {} transactions categorized with {} categories",
                start_time.elapsed().as_millis(),
                result.transactions_categorized,
                result.categories_applied
            );

            if result.transactions_categorized > 0 {
                state.events.publish(AppEvent::DataRefresh);
            }

            Json(result).into_response()
        }
        Err(error) => {
            tracing::error!(
                "Failed to apply rules after {:.2}ms: {error}",
                start_time.elapsed().as_millis()
            );
            error.into_response()
        }
    }
}
