use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    events::EventBus,
    settings::get_settings,
    sync::{
        runner::{SyncOptions, SyncReport, run_sync},
        scraper::Scraper,
    },
    timezone::local_today,
};

/// Whether a sync is running and how the last one went.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    /// Whether a sync is running right now.
    pub running: bool,
    /// The report of the last finished sync.
    pub last_run: Option<SyncReport>,
}

/// The scraper and the status of background syncs.
#[derive(Clone)]
pub struct SyncState {
    /// The scraper used for every sync.
    pub scraper: Arc<dyn Scraper>,
    /// Shared with the running sync task.
    pub status: Arc<Mutex<SyncStatus>>,
}

impl SyncState {
    /// Create the sync state for `scraper` with no sync running.
    pub fn new(scraper: Arc<dyn Scraper>) -> Self {
        Self {
            scraper,
            status: Arc::new(Mutex::new(SyncStatus::default())),
        }
    }

    /// Mark a sync as running until the returned [RunningSync] is finished or dropped.
    ///
    /// # Errors
    /// Returns [Error::SyncAlreadyRunning] if a sync is already running, or
    /// [Error::SyncStatusLockError] if the status lock is poisoned.
    pub fn try_start(&self) -> Result<RunningSync, Error> {
        let mut status = self.status.lock().map_err(|error| {
            tracing::error!("could not acquire sync status lock: {error}");
            Error::SyncStatusLockError
        })?;

        if status.running {
            return Err(Error::SyncAlreadyRunning);
        }

        status.running = true;
        Ok(RunningSync {
            status: self.status.clone(),
            finished: false,
        })
    }

    /// A copy of the current status.
    ///
    /// # Errors
    /// Returns [Error::SyncStatusLockError] if the status lock is poisoned.
    pub fn status(&self) -> Result<SyncStatus, Error> {
        self.status
            .lock()
            .map(|status| status.clone())
            .map_err(|error| {
                tracing::error!("could not acquire sync status lock: {error}");
                Error::SyncStatusLockError
            })
    }

    /// Start a sync in the background.
    ///
    /// # Errors
    /// Returns [Error::SyncAlreadyRunning] if a sync is already running.
    pub fn spawn(
        &self,
        db_connection: Arc<Mutex<Connection>>,
        events: EventBus,
        options: SyncOptions,
        today: time::Date,
    ) -> Result<(), Error> {
        let running = self.try_start()?;

        let scraper = self.scraper.clone();
        tokio::spawn(async move {
            let report = run_sync(scraper.as_ref(), &db_connection, &events, &options, today).await;
            running.finish(report);
        });

        Ok(())
    }
}

/// A sync marked as running in [SyncStatus].
///
/// Dropping it without calling [RunningSync::finish], e.g. when the sync task
/// panics, clears the running flag without recording a report.
#[derive(Debug)]
pub struct RunningSync {
    status: Arc<Mutex<SyncStatus>>,
    finished: bool,
}

impl RunningSync {
    /// Mark the sync as finished with `report`.
    pub fn finish(mut self, report: SyncReport) {
        self.finished = true;
        let mut status = lock_ignoring_poison(&self.status);
        status.running = false;
        status.last_run = Some(report);
    }
}

impl Drop for RunningSync {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("background sync ended without a report");
            lock_ignoring_poison(&self.status).running = false;
        }
    }
}

fn lock_ignoring_poison(status: &Mutex<SyncStatus>) -> MutexGuard<'_, SyncStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The state needed to start a background sync.
#[derive(Clone)]
pub struct BackgroundSyncState {
    db_connection: Arc<Mutex<Connection>>,
    events: EventBus,
    sync: SyncState,
    local_timezone: String,
}

impl FromRef<AppState> for BackgroundSyncState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            events: state.events.clone(),
            sync: state.sync.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

impl FromRef<AppState> for SyncState {
    fn from_ref(state: &AppState) -> Self {
        state.sync.clone()
    }
}

/// Overrides for a manually started sync.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Fetch this many days instead of the configured number.
    pub days_back: Option<u16>,
    /// Wait this many seconds between vendors instead of the configured delay.
    pub delay_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SyncStarted {
    started: bool,
    vendors: Vec<String>,
    days_back: u16,
}

/// A route handler that starts a background sync and responds with 202 Accepted.
pub async fn start_background_sync_endpoint(
    State(state): State<BackgroundSyncState>,
    request: Option<Json<SyncRequest>>,
) -> Response {
    let request = request.map(|Json(request)| request).unwrap_or_default();

    let settings = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        match get_settings(&connection) {
            Ok(settings) => settings,
            Err(error) => return error.into_response(),
        }
    };

    let mut options = SyncOptions::from_settings(&settings, &state.local_timezone);
    if let Some(days_back) = request.days_back {
        if !(1..=365).contains(&days_back) {
            return Error::InvalidSetting(format!(
                "days_back must be between 1 and 365, got {days_back}"
            ))
            .into_response();
        }
        options.days_back = days_back;
    }
    if let Some(delay_seconds) = request.delay_seconds {
        options.delay = Duration::from_secs(delay_seconds);
    }

    let today = match local_today(&state.local_timezone) {
        Ok(today) => today,
        Err(error) => return error.into_response(),
    };

    let started = SyncStarted {
        started: true,
        vendors: options.vendors.clone(),
        days_back: options.days_back,
    };

    match state
        .sync
        .spawn(state.db_connection, state.events, options, today)
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(started)).into_response(),
        Err(error) => {
            tracing::warn!("refused to start sync: {error}");
            error.into_response()
        }
    }
}

/// A route handler that reports whether a sync is running and the last result.
pub async fn get_background_sync_status_endpoint(State(sync): State<SyncState>) -> Response {
    match sync.status() {
        Ok(status) => Json(status).into_response(),
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        Router,
        http::StatusCode,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use time::macros::date;

    use crate::{
        Error, endpoints,
        settings::{Settings, save_settings},
        sync::SyncOptions,
        test_utils::{FakeScraper, TEST_TIMEZONE, get_test_state_with},
    };

    use super::{get_background_sync_status_endpoint, start_background_sync_endpoint};

    fn get_test_server(scraper: FakeScraper) -> (TestServer, crate::AppState) {
        let state = get_test_state_with(Arc::new(scraper));
        {
            let connection = state.db_connection.lock().unwrap();
            save_settings(
                &Settings {
                    revision: 1,
                    sync_vendors: vec!["max".to_owned()],
                    ..Default::default()
                },
                &connection,
            )
            .unwrap();
        }

        let app = Router::new()
            .route(endpoints::BACKGROUND_SYNC, post(start_background_sync_endpoint))
            .route(
                endpoints::BACKGROUND_SYNC_STATUS,
                get(get_background_sync_status_endpoint),
            )
            .with_state(state.clone());

        (TestServer::new(app), state)
    }

    #[tokio::test]
    async fn second_start_while_running_is_a_conflict() {
        let (server, state) =
            get_test_server(FakeScraper::default().with_delay(Duration::from_secs(5)));

        let first = server.post(endpoints::BACKGROUND_SYNC).await;
        let second = server.post(endpoints::BACKGROUND_SYNC).await;

        first.assert_status(StatusCode::ACCEPTED);
        second.assert_status(StatusCode::CONFLICT);
        assert!(state.sync.status().unwrap().running);
    }

    #[tokio::test]
    async fn status_reports_last_run_when_finished() {
        let (server, state) = get_test_server(
            FakeScraper::default().with_transactions("max", &[("2025-03-01", "COFFEE", -12.0)]),
        );

        server
            .post(endpoints::BACKGROUND_SYNC)
            .json(&json!({"days_back": 7}))
            .await
            .assert_status(StatusCode::ACCEPTED);
        for _ in 0..100 {
            if !state.sync.status().unwrap().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let response = server.get(endpoints::BACKGROUND_SYNC_STATUS).await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["running"], json!(false));
        assert_eq!(body["last_run"]["vendors"][0]["vendor"], json!("max"));
        assert_eq!(body["last_run"]["vendors"][0]["imported"]["inserted"], json!(1));
    }

    #[tokio::test]
    async fn out_of_range_days_back_is_rejected() {
        let (server, _) = get_test_server(FakeScraper::default());

        let response = server
            .post(endpoints::BACKGROUND_SYNC)
            .json(&json!({"days_back": 0}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn a_panicking_sync_does_not_stay_running() {
        let (_, state) = get_test_server(FakeScraper::default().panicking("max"));
        let options = SyncOptions {
            vendors: vec!["max".to_owned()],
            days_back: 7,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
            retries: 0,
            show_browser: false,
            local_timezone: TEST_TIMEZONE.to_owned(),
        };

        state
            .sync
            .spawn(
                state.db_connection.clone(),
                state.events.clone(),
                options,
                date!(2025 - 03 - 10),
            )
            .unwrap();
        for _ in 0..100 {
            if !state.sync.status().unwrap().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = state.sync.status().unwrap();
        assert!(!status.running);
        assert_eq!(status.last_run, None);
        assert!(state.sync.try_start().is_ok());
    }

    #[test]
    fn already_running_is_reported_while_a_sync_is_held() {
        let state = crate::test_utils::get_test_state();

        let running = state.sync.try_start().unwrap();

        assert_eq!(state.sync.try_start().unwrap_err(), Error::SyncAlreadyRunning);
        drop(running);
        assert!(state.sync.try_start().is_ok());
    }
}
