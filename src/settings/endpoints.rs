use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    events::{AppEvent, EventBus},
    settings::{
        db::{get_settings, save_settings},
        model::Settings,
    },
};

/// The state needed to read and write the settings.
#[derive(Debug, Clone)]
pub struct SettingsState {
    /// The database connection for managing settings.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Notifies clients that reports may have changed.
    pub events: EventBus,
}

impl FromRef<AppState> for SettingsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
        }
    }
}

/// Sent with a 409 so the client can rebase its edits on the stored settings.
#[derive(Debug, Serialize)]
struct StaleSettingsBody {
    error: String,
    settings: Settings,
}

/// A route handler that returns the current settings.
pub async fn get_settings_endpoint(State(state): State<SettingsState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_settings(&connection) {
        Ok(settings) => Json(settings).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler that replaces the settings.
///
/// Responds with 409 and the stored settings when the submitted revision is
/// not newer than the stored one.
pub async fn put_settings_endpoint(
    State(state): State<SettingsState>,
    Json(settings): Json<Settings>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match save_settings(&settings, &connection) {
        Ok(saved) => {
            tracing::info!("saved settings revision {}", saved.revision);
            state.events.publish(AppEvent::DataRefresh);
            Json(saved).into_response()
        }
        Err(error @ Error::StaleSettingsRevision { .. }) => {
            tracing::warn!("rejected settings save: {error}");

            match get_settings(&connection) {
                Ok(current) => (
                    StatusCode::CONFLICT,
                    Json(StaleSettingsBody {
                        error: error.to_string(),
                        settings: current,
                    }),
                )
                    .into_response(),
                Err(error) => error.into_response(),
            }
        }
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{endpoints, settings::model::Settings, test_utils::get_test_state};

    use super::{get_settings_endpoint, put_settings_endpoint};

    fn get_test_server() -> TestServer {
        let app = Router::new()
            .route(
                endpoints::SETTINGS,
                get(get_settings_endpoint).put(put_settings_endpoint),
            )
            .with_state(get_test_state());

        TestServer::new(app)
    }

    #[tokio::test]
    async fn get_returns_defaults_with_revision() {
        let server = get_test_server();

        let response = server.get(endpoints::SETTINGS).await;

        response.assert_status_ok();
        assert_eq!(response.json::<Settings>(), Settings::default());
        assert_eq!(response.json::<Value>()["revision"], json!(0));
    }

    #[tokio::test]
    async fn put_with_newer_revision_is_stored() {
        let server = get_test_server();
        let settings = Settings {
            revision: 1,
            sync_enabled: true,
            sync_vendors: vec!["max".to_owned()],
            ..Default::default()
        };

        server
            .put(endpoints::SETTINGS)
            .json(&settings)
            .await
            .assert_status_ok();
        let response = server.get(endpoints::SETTINGS).await;

        assert_eq!(response.json::<Settings>(), settings);
    }

    #[tokio::test]
    async fn put_with_stale_revision_returns_conflict_and_current_settings() {
        let server = get_test_server();
        let saved = Settings {
            revision: 3,
            currency_symbol: "$".to_owned(),
            ..Default::default()
        };
        server.put(endpoints::SETTINGS).json(&saved).await;

        let response = server
            .put(endpoints::SETTINGS)
            .json(&Settings {
                revision: 2,
                ..Default::default()
            })
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let body = response.json::<Value>();
        assert_eq!(body["settings"]["revision"], json!(3));
        assert_eq!(body["settings"]["currency_symbol"], json!("$"));
    }

    #[tokio::test]
    async fn put_with_invalid_field_is_bad_request() {
        let server = get_test_server();

        let response = server
            .put(endpoints::SETTINGS)
            .json(&json!({"revision": 1, "scraper_timeout_seconds": 0}))
            .await;

        response.assert_status_bad_request();
    }
}
