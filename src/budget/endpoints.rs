use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    budget::{
        db::{
            clear_total_budget_limit, delete_budget, get_all_budgets, get_category_spending,
            get_credit_card_spending, get_total_budget_limit, set_total_budget_limit,
            upsert_budget,
        },
        form::{BudgetForm, deserialize_number_or_string, validate_budget_limit},
        spending::{
            BudgetId, BudgetWithSpending, CategorySpending, TotalSpendBudget,
            join_budgets_with_spending,
        },
    },
    events::{AppEvent, EventBus},
    period::{Period, PeriodQuery, resolve_period},
};

/// The state needed for the budget routes.
#[derive(Debug, Clone)]
pub struct BudgetState {
    /// The database connection for managing budgets.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Notifies clients that budgets changed.
    pub events: EventBus,
    /// The local timezone as a canonical timezone name.
    pub local_timezone: String,
}

impl FromRef<AppState> for BudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Category spending and budgets of a period.
#[derive(Debug, Serialize)]
pub struct BudgetVsActual {
    period: Period,
    categories: Vec<CategorySpending>,
    budgets: Vec<BudgetWithSpending>,
}

/// The body of a request that sets the total spend budget.
#[derive(Debug, Deserialize)]
pub struct TotalBudgetForm {
    #[serde(deserialize_with = "deserialize_number_or_string")]
    budget_limit: String,
}

/// A route handler that lists every budget.
pub async fn get_budgets_endpoint(State(state): State<BudgetState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_budgets(&connection) {
        Ok(budgets) => Json(budgets).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler that creates a budget or updates the limit of an existing one.
pub async fn upsert_budget_endpoint(
    State(state): State<BudgetState>,
    Json(form): Json<BudgetForm>,
) -> Response {
    let budget = match form.validate() {
        Ok(budget) => budget,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match upsert_budget(&budget.category, budget.budget_limit, &connection) {
        Ok(budget) => {
            state.events.publish(AppEvent::DataRefresh);
            Json(budget).into_response()
        }
        Err(error) => {
            tracing::error!("could not save budget for {}: {error}", budget.category);
            error.into_response()
        }
    }
}

/// A route handler that deletes a budget.
pub async fn delete_budget_endpoint(
    Path(budget_id): Path<BudgetId>,
    State(state): State<BudgetState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_budget(budget_id, &connection) {
        Ok(()) => {
            state.events.publish(AppEvent::DataRefresh);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler for the category spending of a period joined with the budgets.
pub async fn get_budget_vs_actual_endpoint(
    State(state): State<BudgetState>,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let result = resolve_period(&query, &state.local_timezone, &connection).and_then(|period| {
        let categories = get_category_spending(&period, &connection)?;
        let budgets = get_all_budgets(&connection)?;
        let budgets = join_budgets_with_spending(&budgets, &categories);

        Ok(BudgetVsActual {
            period,
            categories,
            budgets,
        })
    });

    match result {
        Ok(report) => Json(report).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Compute the total spend budget of `period`.
pub fn get_total_spend_budget(
    period: &Period,
    connection: &Connection,
) -> Result<TotalSpendBudget, Error> {
    let budget_limit = get_total_budget_limit(connection)?;
    let actual_spent = get_credit_card_spending(period, connection)?;

    Ok(TotalSpendBudget::new(budget_limit, actual_spent))
}

/// A route handler for the total spend budget of a period.
pub async fn get_total_budget_endpoint(
    State(state): State<BudgetState>,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match resolve_period(&query, &state.local_timezone, &connection)
        .and_then(|period| get_total_spend_budget(&period, &connection))
    {
        Ok(total) => Json(total).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler that sets the total spend budget.
///
/// Responds with the total spend budget of the current period.
pub async fn set_total_budget_endpoint(
    State(state): State<BudgetState>,
    Json(form): Json<TotalBudgetForm>,
) -> Response {
    let budget_limit = match validate_budget_limit(&form.budget_limit) {
        Ok(budget_limit) => budget_limit,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let result = set_total_budget_limit(budget_limit, &connection)
        .and_then(|()| resolve_period(&PeriodQuery::default(), &state.local_timezone, &connection))
        .and_then(|period| get_total_spend_budget(&period, &connection));

    match result {
        Ok(total) => {
            state.events.publish(AppEvent::DataRefresh);
            Json(total).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler that clears the total spend budget.
pub async fn delete_total_budget_endpoint(State(state): State<BudgetState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match clear_total_budget_limit(&connection) {
        Ok(()) => {
            state.events.publish(AppEvent::DataRefresh);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        http::StatusCode,
        routing::{delete, get},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use time::macros::date;

    use crate::{
        AppState,
        budget::spending::Budget,
        endpoints::{self, format_endpoint},
        test_utils::get_test_state,
        transaction::{Transaction, create_transaction},
    };

    use super::{
        delete_budget_endpoint, delete_total_budget_endpoint, get_budget_vs_actual_endpoint,
        get_budgets_endpoint, get_total_budget_endpoint, set_total_budget_endpoint,
        upsert_budget_endpoint,
    };

    fn get_test_server() -> (TestServer, AppState) {
        let state = get_test_state();
        let app = Router::new()
            .route(
                endpoints::BUDGETS,
                get(get_budgets_endpoint).post(upsert_budget_endpoint),
            )
            .route(endpoints::BUDGET, delete(delete_budget_endpoint))
            .route(endpoints::BUDGET_VS_ACTUAL, get(get_budget_vs_actual_endpoint))
            .route(
                endpoints::TOTAL_BUDGET,
                get(get_total_budget_endpoint)
                    .post(set_total_budget_endpoint)
                    .delete(delete_total_budget_endpoint),
            )
            .with_state(state.clone());

        (TestServer::new(app), state)
    }

    #[tokio::test]
    async fn groceries_budget_vs_actual() {
        let (server, state) = get_test_server();
        {
            let connection = state.db_connection.lock().unwrap();
            for price in [-1500.0, -1000.0] {
                create_transaction(
                    Transaction::build(price, date!(2025 - 03 - 10), "SHUFERSAL", "max")
                        .category(Some("Groceries")),
                    &connection,
                )
                .unwrap();
            }
        }
        server
            .post(endpoints::BUDGETS)
            .json(&json!({"category": "Groceries", "budget_limit": 2000}))
            .await
            .assert_status_ok();

        let response = server
            .get(endpoints::BUDGET_VS_ACTUAL)
            .add_query_param("year", 2025)
            .add_query_param("month", 3)
            .await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["period"]["start"], json!("2025-03-01"));
        assert_eq!(body["budgets"][0]["category"], json!("Groceries"));
        assert_eq!(body["budgets"][0]["actual_spent"], json!(2500.0));
        assert_eq!(body["budgets"][0]["percent_used"], json!(125.0));
        assert_eq!(body["budgets"][0]["is_over_budget"], json!(true));
    }

    #[tokio::test]
    async fn posting_same_category_updates_the_budget() {
        let (server, _) = get_test_server();

        let first = server
            .post(endpoints::BUDGETS)
            .json(&json!({"category": "Fuel", "budget_limit": "500"}))
            .await
            .json::<Budget>();
        let second = server
            .post(endpoints::BUDGETS)
            .json(&json!({"category": "Fuel", "budget_limit": 650}))
            .await
            .json::<Budget>();

        assert_eq!(first.id, second.id);
        let budgets = server.get(endpoints::BUDGETS).await.json::<Vec<Budget>>();
        assert_eq!(budgets, vec![second]);
    }

    #[tokio::test]
    async fn invalid_budget_limit_is_bad_request() {
        let (server, _) = get_test_server();

        let response = server
            .post(endpoints::BUDGETS)
            .json(&json!({"category": "Fuel", "budget_limit": -1}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn delete_budget_then_missing() {
        let (server, _) = get_test_server();
        let budget = server
            .post(endpoints::BUDGETS)
            .json(&json!({"category": "Fuel", "budget_limit": 500}))
            .await
            .json::<Budget>();

        server
            .delete(&format_endpoint(endpoints::BUDGET, budget.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&format_endpoint(endpoints::BUDGET, budget.id))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn total_budget_delete_then_get_is_unset() {
        let (server, _) = get_test_server();
        server
            .post(endpoints::TOTAL_BUDGET)
            .json(&json!({"budget_limit": 5000}))
            .await
            .assert_status_ok();
        assert_eq!(
            server.get(endpoints::TOTAL_BUDGET).await.json::<Value>()["is_set"],
            json!(true)
        );

        server
            .delete(endpoints::TOTAL_BUDGET)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let response = server.get(endpoints::TOTAL_BUDGET).await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["is_set"], json!(false));
        assert_eq!(body["budget_limit"], Value::Null);
    }
}
