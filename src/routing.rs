//! Application router configuration for the JSON API.

use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};

use crate::{
    AppState, Error,
    budget::{
        delete_budget_endpoint, delete_total_budget_endpoint, get_budget_vs_actual_endpoint,
        get_budgets_endpoint, get_total_budget_endpoint, set_total_budget_endpoint,
        upsert_budget_endpoint,
    },
    card::{get_cards_endpoint, update_card_ownership_endpoint, upsert_card_endpoint},
    categorize::{get_uncategorized_descriptions_endpoint, update_category_by_description_endpoint},
    category::get_categories_endpoint,
    endpoints,
    events::get_event_stream,
    logging::logging_middleware,
    report::get_monthly_summary_endpoint,
    rule::{apply_rules_endpoint, delete_rule_endpoint, get_rules_endpoint},
    settings::{get_settings_endpoint, put_settings_endpoint, update_library_endpoint},
    sync::{get_background_sync_status_endpoint, start_background_sync_endpoint},
    transaction::{
        delete_all_transactions_endpoint, export_all_transactions_endpoint,
        get_transactions_by_description_endpoint, get_transactions_endpoint,
    },
    whatsapp::{
        disconnect_endpoint, get_contacts_endpoint, get_qr_endpoint, get_status_endpoint,
        send_message_endpoint, send_test_summary_endpoint, set_status_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let budget_routes = Router::new()
        .route(
            endpoints::BUDGETS,
            get(get_budgets_endpoint).post(upsert_budget_endpoint),
        )
        .route(endpoints::BUDGET, delete(delete_budget_endpoint))
        .route(
            endpoints::BUDGET_VS_ACTUAL,
            get(get_budget_vs_actual_endpoint),
        )
        .route(
            endpoints::TOTAL_BUDGET,
            get(get_total_budget_endpoint)
                .post(set_total_budget_endpoint)
                .delete(delete_total_budget_endpoint),
        )
        .route(
            endpoints::MONTHLY_SUMMARY,
            get(get_monthly_summary_endpoint),
        );

    let category_routes = Router::new()
        .route(endpoints::CATEGORIES, get(get_categories_endpoint))
        .route(endpoints::ALL_CATEGORIES, get(get_categories_endpoint))
        .route(
            endpoints::UNCATEGORIZED_DESCRIPTIONS,
            get(get_uncategorized_descriptions_endpoint),
        )
        .route(
            endpoints::UPDATE_CATEGORY_BY_DESCRIPTION,
            post(update_category_by_description_endpoint),
        )
        .route(
            endpoints::CATEGORIES_UPDATE_BY_DESCRIPTION,
            post(update_category_by_description_endpoint),
        )
        .route(endpoints::RULES, get(get_rules_endpoint))
        .route(endpoints::RULE, delete(delete_rule_endpoint))
        .route(endpoints::RULES_APPLY, post(apply_rules_endpoint));

    let transaction_routes = Router::new()
        .route(endpoints::TRANSACTIONS, get(get_transactions_endpoint))
        .route(
            endpoints::TRANSACTIONS_BY_DESCRIPTION,
            get(get_transactions_by_description_endpoint),
        )
        .route(
            endpoints::EXPORT_ALL_TRANSACTIONS,
            get(export_all_transactions_endpoint),
        )
        .route(
            endpoints::DELETE_ALL_TRANSACTIONS,
            delete(delete_all_transactions_endpoint),
        )
        .route(
            endpoints::CARDS,
            get(get_cards_endpoint).post(upsert_card_endpoint),
        )
        .route(
            endpoints::CARD_OWNERSHIP,
            patch(update_card_ownership_endpoint),
        );

    let service_routes = Router::new()
        .route(
            endpoints::SETTINGS,
            get(get_settings_endpoint).put(put_settings_endpoint),
        )
        .route(endpoints::UPDATE_LIBRARY, post(update_library_endpoint))
        .route(
            endpoints::BACKGROUND_SYNC,
            post(start_background_sync_endpoint),
        )
        .route(
            endpoints::BACKGROUND_SYNC_STATUS,
            get(get_background_sync_status_endpoint),
        )
        .route(
            endpoints::WHATSAPP_STATUS,
            get(get_status_endpoint).post(set_status_endpoint),
        )
        .route(
            endpoints::WHATSAPP_WEBJS_STATUS,
            get(get_status_endpoint).post(set_status_endpoint),
        )
        .route(endpoints::WHATSAPP_WEBJS_QR, get(get_qr_endpoint))
        .route(
            endpoints::WHATSAPP_WEBJS_DISCONNECT,
            post(disconnect_endpoint),
        )
        .route(endpoints::WHATSAPP_WEBJS_SEND, post(send_message_endpoint))
        .route(
            endpoints::WHATSAPP_WEBJS_CONTACTS,
            get(get_contacts_endpoint),
        )
        .route(endpoints::WHATSAPP_TEST, post(send_test_summary_endpoint))
        .route(
            endpoints::WHATSAPP_TEST_ALIAS,
            post(send_test_summary_endpoint),
        )
        .route(endpoints::EVENTS, get(get_event_stream));

    budget_routes
        .merge(category_routes)
        .merge(transaction_routes)
        .merge(service_routes)
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
