use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    pagination::{PageQuery, PaginationConfig},
    period::{PeriodQuery, resolve_period},
    report::summary::{SummaryQuery, get_monthly_summary},
};

/// The state needed for the report routes.
#[derive(Debug, Clone)]
pub struct ReportState {
    /// The database connection for reading transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name.
    pub local_timezone: String,
    /// The default and maximum page sizes.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for ReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// A route handler for the grouped, sorted and paged monthly summary.
pub async fn get_monthly_summary_endpoint(
    State(state): State<ReportState>,
    Query(period_query): Query<PeriodQuery>,
    Query(summary_query): Query<SummaryQuery>,
    Query(page_query): Query<PageQuery>,
) -> Response {
    let page = page_query.resolve(&state.pagination_config);

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let result = resolve_period(&period_query, &state.local_timezone, &connection).and_then(
        |period| {
            get_monthly_summary(
                &period,
                summary_query.group_by.unwrap_or_default(),
                summary_query.sort_by.unwrap_or_default(),
                summary_query.sort_order.unwrap_or_default(),
                page,
                &connection,
            )
        },
    );

    match result {
        Ok(summary) => Json(summary).into_response(),
        Err(error) => error.into_response(),
    }
}
