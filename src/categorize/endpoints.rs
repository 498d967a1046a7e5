use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    categorize::queue::{get_uncategorized_descriptions, update_category_by_description},
    category::CategoryName,
    events::{AppEvent, EventBus},
    rule::upsert_rule,
};

/// The state needed for quick categorization.
#[derive(Debug, Clone)]
pub struct CategorizeState {
    /// The database connection for reading and updating transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Notifies clients that categories changed.
    pub events: EventBus,
}

impl FromRef<AppState> for CategorizeState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
        }
    }
}

/// Assign a category to every transaction with a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizeRequest {
    /// The exact transaction name to match.
    pub description: String,
    /// The category to assign.
    pub category: String,
    /// Whether to also save a description rule. Defaults to true.
    #[serde(default)]
    pub create_rule: Option<bool>,
}

/// The result of categorizing by description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizeResponse {
    /// How many transactions now have the category.
    pub transactions_updated: usize,
    /// Whether a description rule was saved.
    pub rule_created: bool,
}

/// A route handler for the descriptions of uncategorized transactions.
pub async fn get_uncategorized_descriptions_endpoint(
    State(state): State<CategorizeState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_uncategorized_descriptions(&connection) {
        Ok(descriptions) => Json(descriptions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler that categorizes every transaction with a description and
/// optionally remembers the choice as a description rule.
pub async fn update_category_by_description_endpoint(
    State(state): State<CategorizeState>,
    Json(request): Json<CategorizeRequest>,
) -> Response {
    let category = match CategoryName::new(&request.category) {
        Ok(category) => category,
        Err(error) => return error.into_response(),
    };
    let create_rule = request.create_rule.unwrap_or(true);

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match categorize(&request.description, &category, create_rule, &connection) {
        Ok(response) => {
            tracing::info!(
                "categorized {} transactions named {:?} as {category}",
                response.transactions_updated,
                request.description
            );
            state.events.publish(AppEvent::DataRefresh);
            Json(response).into_response()
        }
        Err(error) => error.into_response(),
    }
}

fn categorize(
    description: &str,
    category: &CategoryName,
    create_rule: bool,
    connection: &Connection,
) -> Result<CategorizeResponse, Error> {
    let tx = connection.unchecked_transaction()?;

    let transactions_updated = update_category_by_description(description, category, &tx)?;
    if create_rule {
        upsert_rule(description.trim(), category.as_ref(), &tx)?;
    }

    tx.commit()?;

    Ok(CategorizeResponse {
        transactions_updated,
        rule_created: create_rule,
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::json;
    use time::macros::date;

    use crate::{
        AppState, endpoints,
        rule::get_all_rules,
        test_utils::get_test_state,
        transaction::{Transaction, create_transaction, get_transactions_by_description},
    };

    use super::{
        CategorizeResponse, get_uncategorized_descriptions_endpoint,
        update_category_by_description_endpoint,
    };

    fn get_test_server(state: AppState) -> TestServer {
        let app = Router::new()
            .route(
                endpoints::UNCATEGORIZED_DESCRIPTIONS,
                get(get_uncategorized_descriptions_endpoint),
            )
            .route(
                endpoints::UPDATE_CATEGORY_BY_DESCRIPTION,
                post(update_category_by_description_endpoint),
            )
            .with_state(state);

        TestServer::new(app)
    }

    fn seeded_state() -> AppState {
        let state = get_test_state();
        {
            let connection = state.db_connection.lock().unwrap();
            for price in [-40.0, -60.0] {
                create_transaction(
                    Transaction::build(price, date!(2025 - 03 - 01), "WOLT", "max"),
                    &connection,
                )
                .unwrap();
            }
        }
        state
    }

    #[tokio::test]
    async fn categorizes_and_creates_rule() {
        let state = seeded_state();
        let mut events = state.events.subscribe();
        let server = get_test_server(state.clone());

        let response = server
            .post(endpoints::UPDATE_CATEGORY_BY_DESCRIPTION)
            .json(&json!({"description": "WOLT", "category": "Delivery"}))
            .await;

        response.assert_status_ok();
        response.assert_json(&CategorizeResponse {
            transactions_updated: 2,
            rule_created: true,
        });
        let connection = state.db_connection.lock().unwrap();
        let rules = get_all_rules(&connection).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, "WOLT");
        assert_eq!(rules[0].category, "Delivery");
        let transactions = get_transactions_by_description("WOLT", &connection).unwrap();
        assert!(transactions.iter().all(|t| t.category.as_deref() == Some("Delivery")));
        assert!(events.try_recv().is_ok());
    }

    #[tokio::test]
    async fn create_rule_false_skips_rule() {
        let state = seeded_state();
        let server = get_test_server(state.clone());

        let response = server
            .post(endpoints::UPDATE_CATEGORY_BY_DESCRIPTION)
            .json(&json!({"description": "WOLT", "category": "Delivery", "create_rule": false}))
            .await;

        response.assert_status_ok();
        response.assert_json(&CategorizeResponse {
            transactions_updated: 2,
            rule_created: false,
        });
        let connection = state.db_connection.lock().unwrap();
        assert_eq!(get_all_rules(&connection).unwrap(), vec![]);
    }

    #[tokio::test]
    async fn blank_category_is_rejected() {
        let server = get_test_server(seeded_state());

        let response = server
            .post(endpoints::UPDATE_CATEGORY_BY_DESCRIPTION)
            .json(&json!({"description": "WOLT", "category": "  "}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn lists_uncategorized_descriptions() {
        let server = get_test_server(seeded_state());

        let response = server.get(endpoints::UNCATEGORIZED_DESCRIPTIONS).await;

        response.assert_status_ok();
        response.assert_json(&json!([
            {"description": "WOLT", "count": 2, "total_amount": -100.0}
        ]));
    }
}
