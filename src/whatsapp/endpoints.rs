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
    settings::{Settings, WhatsAppBackend, get_settings},
    whatsapp::{
        SessionState, WhatsAppState, bridge::BridgeConfig, summary::build_current_summary,
    },
};

/// The state needed for the WhatsApp routes.
#[derive(Clone)]
pub struct WhatsAppEndpointState {
    /// The database connection for reading settings and spending.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name.
    pub local_timezone: String,
    /// The bridge and session.
    pub whatsapp: WhatsAppState,
}

impl FromRef<AppState> for WhatsAppEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
            whatsapp: state.whatsapp.clone(),
        }
    }
}

/// The body for turning the session on or off.
#[derive(Debug, Clone, Deserialize)]
pub struct SetStatusRequest {
    /// True to pair, false to disconnect.
    pub enabled: bool,
}

/// The body for sending a message.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    /// The recipient's phone number.
    pub to: String,
    /// The text to send.
    pub message: String,
}

/// Whether a message was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    /// Always true; failures are reported as errors.
    pub sent: bool,
    /// The recipient.
    pub to: String,
    /// The text that was sent.
    pub message: String,
}

#[derive(Debug, Serialize)]
struct QrResponse<'a> {
    qr: &'a str,
}

fn load_settings(db_connection: &Arc<Mutex<Connection>>) -> Result<Settings, Error> {
    let connection = db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    get_settings(&connection)
}

fn status_response(state: &WhatsAppEndpointState) -> Response {
    let result = load_settings(&state.db_connection).and_then(|settings| {
        state
            .whatsapp
            .session()
            .map(|session| session.status(settings.whatsapp_backend))
    });

    match result {
        Ok(status) => Json(status).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Compose the current period's summary and send it to the configured recipient.
///
/// Returns the sent message.
///
/// # Errors
/// Returns [Error::WhatsAppNotConfigured] if WhatsApp is disabled or has no
/// recipient, or an error if composing or sending fails.
pub async fn send_daily_summary(
    db_connection: &Arc<Mutex<Connection>>,
    local_timezone: &str,
    whatsapp: &WhatsAppState,
) -> Result<SendResponse, Error> {
    let (settings, message) = {
        let connection = db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        let settings = get_settings(&connection)?;
        if !settings.whatsapp_enabled {
            return Err(Error::WhatsAppNotConfigured("WhatsApp is disabled".to_owned()));
        }

        let message = build_current_summary(local_timezone, &connection)?;
        (settings, message)
    };

    let to = settings
        .whatsapp_to
        .as_deref()
        .map(str::trim)
        .filter(|to| !to.is_empty())
        .ok_or_else(|| Error::WhatsAppNotConfigured("no recipient is set".to_owned()))?
        .to_owned();

    whatsapp
        .bridge
        .send(&BridgeConfig::from(&settings), &to, &message)
        .await?;

    Ok(SendResponse {
        sent: true,
        to,
        message,
    })
}

/// A route handler for the session status and how soon to poll again.
pub async fn get_status_endpoint(State(state): State<WhatsAppEndpointState>) -> Response {
    status_response(&state)
}

/// A route handler that starts pairing or ends the session.
pub async fn set_status_endpoint(
    State(state): State<WhatsAppEndpointState>,
    Json(request): Json<SetStatusRequest>,
) -> Response {
    let result = if request.enabled {
        match load_settings(&state.db_connection) {
            Ok(settings) => state.whatsapp.connect(&BridgeConfig::from(&settings)).await,
            Err(error) => Err(error),
        }
    } else {
        state.whatsapp.disconnect().await
    };

    match result {
        Ok(()) => status_response(&state),
        Err(error) => error.into_response(),
    }
}

/// A route handler for the QR code to scan. Responds with 404 when there is none.
pub async fn get_qr_endpoint(State(state): State<WhatsAppEndpointState>) -> Response {
    match state.whatsapp.session() {
        Ok(session) => match session.qr() {
            Some(qr) => Json(QrResponse { qr }).into_response(),
            None => Error::NotFound.into_response(),
        },
        Err(error) => error.into_response(),
    }
}

/// A route handler that ends the session.
pub async fn disconnect_endpoint(State(state): State<WhatsAppEndpointState>) -> Response {
    match state.whatsapp.disconnect().await {
        Ok(()) => status_response(&state),
        Err(error) => error.into_response(),
    }
}

/// A route handler that sends an arbitrary message.
pub async fn send_message_endpoint(
    State(state): State<WhatsAppEndpointState>,
    Json(request): Json<SendMessageRequest>,
) -> Response {
    let to = request.to.trim();
    if to.is_empty() || request.message.trim().is_empty() {
        return Error::InvalidMessage("recipient and message are required".to_owned())
            .into_response();
    }

    let settings = match load_settings(&state.db_connection) {
        Ok(settings) => settings,
        Err(error) => return error.into_response(),
    };

    match state
        .whatsapp
        .bridge
        .send(&BridgeConfig::from(&settings), to, &request.message)
        .await
    {
        Ok(()) => Json(SendResponse {
            sent: true,
            to: to.to_owned(),
            message: request.message,
        })
        .into_response(),
        Err(error) => {
            tracing::error!("could not send WhatsApp message: {error}");
            error.into_response()
        }
    }
}

/// A route handler for the contacts of the paired WhatsApp Web account.
///
/// Responds with 503 unless the WhatsApp Web backend is selected and its
/// session is ready.
pub async fn get_contacts_endpoint(State(state): State<WhatsAppEndpointState>) -> Response {
    let settings = match load_settings(&state.db_connection) {
        Ok(settings) => settings,
        Err(error) => return error.into_response(),
    };

    if settings.whatsapp_backend != WhatsAppBackend::Webjs {
        return Error::WhatsAppNotConfigured(
            "contacts are only available with the WhatsApp Web backend".to_owned(),
        )
        .into_response();
    }

    match state.whatsapp.session() {
        Ok(session) if session.state() == SessionState::Ready => {}
        Ok(_) => {
            return Error::WhatsAppNotConfigured("the WhatsApp session is not ready".to_owned())
                .into_response();
        }
        Err(error) => return error.into_response(),
    }

    match state
        .whatsapp
        .bridge
        .contacts(&BridgeConfig::from(&settings))
        .await
    {
        Ok(contacts) => Json(contacts).into_response(),
        Err(error) => {
            tracing::error!("could not list WhatsApp contacts: {error}");
            error.into_response()
        }
    }
}

/// A route handler that sends the current spending summary as a test message.
pub async fn send_test_summary_endpoint(State(state): State<WhatsAppEndpointState>) -> Response {
    match send_daily_summary(&state.db_connection, &state.local_timezone, &state.whatsapp).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => {
            tracing::warn!("could not send WhatsApp test summary: {error}");
            error.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        http::StatusCode,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        AppState, endpoints,
        settings::{Settings, WhatsAppBackend, save_settings},
        test_utils::{FakeBridge, get_test_state_with_bridge},
        whatsapp::{BridgeEvent, SessionState},
    };

    use super::{
        get_contacts_endpoint, get_qr_endpoint, get_status_endpoint, send_message_endpoint,
        send_test_summary_endpoint, set_status_endpoint,
    };

    fn get_test_server(state: AppState) -> TestServer {
        let app = Router::new()
            .route(
                endpoints::WHATSAPP_STATUS,
                get(get_status_endpoint).post(set_status_endpoint),
            )
            .route(endpoints::WHATSAPP_WEBJS_QR, get(get_qr_endpoint))
            .route(endpoints::WHATSAPP_WEBJS_SEND, post(send_message_endpoint))
            .route(
                endpoints::WHATSAPP_WEBJS_CONTACTS,
                get(get_contacts_endpoint),
            )
            .route(endpoints::WHATSAPP_TEST, post(send_test_summary_endpoint))
            .with_state(state);

        TestServer::new(app)
    }

    fn enable_whatsapp(state: &AppState, to: Option<&str>) {
        let connection = state.db_connection.lock().unwrap();
        save_settings(
            &Settings {
                revision: 1,
                whatsapp_enabled: true,
                whatsapp_to: to.map(str::to_owned),
                ..Settings::default()
            },
            &connection,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn status_starts_disconnected() {
        let server = get_test_server(get_test_state_with_bridge(Arc::new(FakeBridge::default())));

        let response = server.get(endpoints::WHATSAPP_STATUS).await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "backend": "webjs",
            "state": "disconnected",
            "poll_interval_ms": 10000
        }));
    }

    #[tokio::test]
    async fn enabling_reports_progress_from_bridge() {
        let bridge = Arc::new(FakeBridge::default().with_events(vec![BridgeEvent::Qr(
            "2@abc".to_owned(),
        )]));
        let state = get_test_state_with_bridge(bridge);
        let server = get_test_server(state.clone());

        let response = server
            .post(endpoints::WHATSAPP_STATUS)
            .json(&json!({"enabled": true}))
            .await;

        response.assert_status_ok();
        let state_name = response.json::<Value>()["state"].clone();
        assert!(state_name == json!("initializing") || state_name == json!("awaiting_qr"));

        // Let the listener task apply the QR event.
        for _ in 0..100 {
            if state.whatsapp.session().unwrap().qr().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let response = server.get(endpoints::WHATSAPP_WEBJS_QR).await;
        response.assert_status_ok();
        response.assert_json(&json!({"qr": "2@abc"}));
    }

    #[tokio::test]
    async fn qr_is_not_found_before_pairing() {
        let server = get_test_server(get_test_state_with_bridge(Arc::new(FakeBridge::default())));

        server
            .get(endpoints::WHATSAPP_WEBJS_QR)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn send_passes_message_to_bridge() {
        let bridge = Arc::new(FakeBridge::default());
        let server = get_test_server(get_test_state_with_bridge(bridge.clone()));

        let response = server
            .post(endpoints::WHATSAPP_WEBJS_SEND)
            .json(&json!({"to": "+972500000000", "message": "hello"}))
            .await;

        response.assert_status_ok();
        assert_eq!(
            bridge.sent_messages(),
            vec![("+972500000000".to_owned(), "hello".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_summary_requires_whatsapp_enabled() {
        let server = get_test_server(get_test_state_with_bridge(Arc::new(FakeBridge::default())));

        let response = server.post(endpoints::WHATSAPP_TEST).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_summary_requires_recipient() {
        let state = get_test_state_with_bridge(Arc::new(FakeBridge::default()));
        enable_whatsapp(&state, None);
        let server = get_test_server(state);

        let response = server.post(endpoints::WHATSAPP_TEST).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_summary_is_sent_to_recipient() {
        let bridge = Arc::new(FakeBridge::default());
        let state = get_test_state_with_bridge(bridge.clone());
        enable_whatsapp(&state, Some("+972500000000"));
        let server = get_test_server(state);

        let response = server.post(endpoints::WHATSAPP_TEST).await;

        response.assert_status_ok();
        let sent = bridge.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+972500000000");
        assert!(sent[0].1.starts_with("Spending summary"));
    }

    #[tokio::test]
    async fn bridge_failure_is_bad_gateway() {
        let bridge = Arc::new(FakeBridge::default().failing_sends());
        let server = get_test_server(get_test_state_with_bridge(bridge));

        let response = server
            .post(endpoints::WHATSAPP_WEBJS_SEND)
            .json(&json!({"to": "+972500000000", "message": "hello"}))
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn contacts_require_a_ready_session() {
        let bridge = Arc::new(FakeBridge::default().with_contacts(&[("Noa", "+972501112222")]));
        let server = get_test_server(get_test_state_with_bridge(bridge));

        let response = server.get(endpoints::WHATSAPP_WEBJS_CONTACTS).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn contacts_are_listed_once_paired() {
        let bridge = Arc::new(
            FakeBridge::default()
                .with_events(vec![BridgeEvent::Ready])
                .with_contacts(&[("Noa", "+972501112222")]),
        );
        let state = get_test_state_with_bridge(bridge);
        let server = get_test_server(state.clone());
        server
            .post(endpoints::WHATSAPP_STATUS)
            .json(&json!({"enabled": true}))
            .await
            .assert_status_ok();
        for _ in 0..100 {
            if state.whatsapp.session().unwrap().state() == SessionState::Ready {
                break;
            }
            tokio::task::yield_now().await;
        }

        let response = server.get(endpoints::WHATSAPP_WEBJS_CONTACTS).await;

        response.assert_status_ok();
        response.assert_json(&json!([{"name": "Noa", "number": "+972501112222"}]));
    }

    #[tokio::test]
    async fn contacts_are_unavailable_with_twilio() {
        let state = get_test_state_with_bridge(Arc::new(FakeBridge::default()));
        {
            let connection = state.db_connection.lock().unwrap();
            save_settings(
                &Settings {
                    revision: 1,
                    whatsapp_backend: WhatsAppBackend::Twilio,
                    ..Settings::default()
                },
                &connection,
            )
            .unwrap();
        }
        let server = get_test_server(state);

        let response = server.get(endpoints::WHATSAPP_WEBJS_CONTACTS).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
