use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    period::{PeriodQuery, resolve_period},
    transaction::core::{AccountFilter, get_transactions_by_description, get_transactions_in_period},
};

/// The state needed for listing transactions.
#[derive(Debug, Clone)]
pub struct TransactionsState {
    /// The database connection for reading transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name.
    pub local_timezone: String,
}

impl FromRef<AppState> for TransactionsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Query parameters for listing the transactions that share a description.
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptionQuery {
    /// The exact transaction name.
    pub description: String,
}

/// A route handler for the transactions of a period, optionally for one card or account.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionsState>,
    Query(period_query): Query<PeriodQuery>,
    Query(filter): Query<AccountFilter>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let result = resolve_period(&period_query, &state.local_timezone, &connection)
        .and_then(|period| get_transactions_in_period(&period, &filter, &connection));

    match result {
        Ok(transactions) => Json(transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for the transactions named exactly `description`.
pub async fn get_transactions_by_description_endpoint(
    State(state): State<TransactionsState>,
    Query(query): Query<DescriptionQuery>,
) -> Response {
    if query.description.trim().is_empty() {
        return Error::EmptyDescription.into_response();
    }

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_transactions_by_description(&query.description, &connection) {
        Ok(transactions) => Json(transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use time::macros::date;

    use crate::{
        endpoints,
        test_utils::get_test_state,
        transaction::{Transaction, create_transaction},
    };

    use super::{get_transactions_by_description_endpoint, get_transactions_endpoint};

    fn get_test_server() -> TestServer {
        let state = get_test_state();
        {
            let connection = state.db_connection.lock().unwrap();
            for (price, date, name, card) in [
                (-10.0, date!(2025 - 03 - 01), "AROMA", "111111"),
                (-20.0, date!(2025 - 03 - 09), "AROMA", "222222"),
                (-30.0, date!(2025 - 03 - 12), "WOLT", "111111"),
            ] {
                create_transaction(
                    Transaction::build(price, date, name, "max").card6_digits(Some(card)),
                    &connection,
                )
                .unwrap();
            }
        }

        let app = Router::new()
            .route(endpoints::TRANSACTIONS, get(get_transactions_endpoint))
            .route(
                endpoints::TRANSACTIONS_BY_DESCRIPTION,
                get(get_transactions_by_description_endpoint),
            )
            .with_state(state);

        TestServer::new(app)
    }

    #[tokio::test]
    async fn lists_billing_cycle_for_one_card() {
        let server = get_test_server();

        let response = server
            .get(endpoints::TRANSACTIONS)
            .add_query_param("year", 2025)
            .add_query_param("month", 4)
            .add_query_param("billing_cycle_start_day", 10)
            .add_query_param("vendor", "max")
            .add_query_param("last4", "1111")
            .await;

        response.assert_status_ok();
        let transactions = response.json::<Vec<Transaction>>();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].name, "WOLT");
    }

    #[tokio::test]
    async fn lists_by_exact_description() {
        let server = get_test_server();

        let response = server
            .get(endpoints::TRANSACTIONS_BY_DESCRIPTION)
            .add_query_param("description", "AROMA")
            .await;

        response.assert_status_ok();
        let transactions = response.json::<Vec<Transaction>>();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].date, date!(2025 - 03 - 09));
    }

    #[tokio::test]
    async fn blank_description_is_rejected() {
        let server = get_test_server();

        let response = server
            .get(endpoints::TRANSACTIONS_BY_DESCRIPTION)
            .add_query_param("description", " ")
            .await;

        response.assert_status_bad_request();
    }
}
