//! Upgrading the scraper library in place.
//!
//! An update is two requests: the client first asks to validate a version
//! and, once that succeeds, asks again to install it. [CommandInstaller]
//! delegates both steps to an external program run as
//! `<program> check <version>` and `<program> install <version>`.

use std::{future::Future, path::PathBuf, pin::Pin, process::Stdio, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::{process::Command, sync::Mutex};

use crate::{AppState, Error};

/// How long checking that a version exists may take.
const CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// How long installing a version may take.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// The future returned by [LibraryInstaller] methods.
pub type InstallFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// Checks for and installs versions of the scraper library.
pub trait LibraryInstaller: Send + Sync {
    /// Check that `version` exists and can be installed.
    fn check<'a>(&'a self, version: &'a str) -> InstallFuture<'a>;

    /// Install `version`, replacing the current one.
    fn install<'a>(&'a self, version: &'a str) -> InstallFuture<'a>;
}

/// Runs an external installer program.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: PathBuf,
}

impl CommandInstaller {
    /// Create an installer that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, action: &str, version: &str, timeout: Duration) -> Result<(), Error> {
        let mut command = Command::new(&self.program);
        command
            .arg(action)
            .arg(version)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!("running {} {action} {version}", self.program.display());

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| Error::LibraryUpdateFailed(format!("{action} {version} timed out")))?
            .map_err(|error| {
                Error::LibraryUpdateFailed(format!(
                    "could not run {}: {error}",
                    self.program.display()
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("exited with {}", output.status));

        Err(Error::LibraryUpdateFailed(reason))
    }
}

impl LibraryInstaller for CommandInstaller {
    fn check<'a>(&'a self, version: &'a str) -> InstallFuture<'a> {
        Box::pin(self.run("check", version, CHECK_TIMEOUT))
    }

    fn install<'a>(&'a self, version: &'a str) -> InstallFuture<'a> {
        Box::pin(self.run("install", version, INSTALL_TIMEOUT))
    }
}

/// Normalize a requested version to `MAJOR.MINOR.PATCH[-PRERELEASE]`.
///
/// Surrounding whitespace and a leading `v` are removed.
///
/// # Errors
/// Returns [Error::InvalidLibraryVersion] if the version is not of that form.
pub fn validate_library_version(version: &str) -> Result<String, Error> {
    let trimmed = version.trim();
    let normalized = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let invalid = || Error::InvalidLibraryVersion(version.to_owned());

    let (release, prerelease) = match normalized.split_once('-') {
        Some((release, prerelease)) => (release, Some(prerelease)),
        None => (normalized, None),
    };

    let parts: Vec<&str> = release.split('.').collect();
    let is_number = |part: &&str| {
        !part.is_empty()
            && part.chars().all(|c| c.is_ascii_digit())
            && (part.len() == 1 || !part.starts_with('0'))
    };
    if parts.len() != 3 || !parts.iter().all(is_number) {
        return Err(invalid());
    }

    if let Some(prerelease) = prerelease {
        let is_identifier = |identifier: &str| {
            !identifier.is_empty()
                && identifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        };
        if !prerelease.split('.').all(is_identifier) {
            return Err(invalid());
        }
    }

    Ok(normalized.to_owned())
}

/// The library installer and the lock that allows one update at a time.
#[derive(Clone, Default)]
pub struct LibraryState {
    /// `None` when the server was started without an installer.
    pub installer: Option<Arc<dyn LibraryInstaller>>,
    updating: Arc<Mutex<()>>,
}

impl LibraryState {
    /// Create the state for `installer`.
    pub fn new(installer: Arc<dyn LibraryInstaller>) -> Self {
        Self {
            installer: Some(installer),
            updating: Arc::default(),
        }
    }

    /// Validate `version` and, unless `validate_only`, install it.
    ///
    /// # Errors
    /// Returns [Error::LibraryUpdaterNotConfigured] without an installer,
    /// [Error::InvalidLibraryVersion] for a malformed version,
    /// [Error::LibraryUpdateInProgress] while another update runs, or
    /// [Error::LibraryUpdateFailed] if the installer fails.
    pub async fn update(
        &self,
        version: &str,
        validate_only: bool,
    ) -> Result<UpdateLibraryResponse, Error> {
        let installer = self
            .installer
            .as_ref()
            .ok_or(Error::LibraryUpdaterNotConfigured)?;
        let version = validate_library_version(version)?;

        let _updating = self
            .updating
            .try_lock()
            .map_err(|_| Error::LibraryUpdateInProgress)?;

        installer.check(&version).await?;
        if validate_only {
            return Ok(UpdateLibraryResponse {
                version,
                validated: true,
                installed: false,
            });
        }

        installer.install(&version).await?;
        tracing::info!("installed scraper library {version}");

        Ok(UpdateLibraryResponse {
            version,
            validated: true,
            installed: true,
        })
    }
}

impl FromRef<AppState> for LibraryState {
    fn from_ref(state: &AppState) -> Self {
        state.library.clone()
    }
}

/// The body of an update request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLibraryRequest {
    /// The version to install, e.g. "6.2.1".
    pub version: String,
    /// Only check that the version can be installed.
    #[serde(default)]
    pub validate_only: bool,
}

/// How an update request went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLibraryResponse {
    /// The normalized version.
    pub version: String,
    /// The version was found.
    pub validated: bool,
    /// The version is now installed.
    pub installed: bool,
}

/// A route handler that validates and then installs a scraper library version.
pub async fn update_library_endpoint(
    State(state): State<LibraryState>,
    Json(request): Json<UpdateLibraryRequest>,
) -> Response {
    match state.update(&request.version, request.validate_only).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => {
            tracing::warn!("could not update the scraper library: {error}");
            error.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde_json::json;

    use crate::{Error, endpoints, test_utils::FakeInstaller};

    use super::{LibraryState, update_library_endpoint, validate_library_version};

    fn get_test_server(state: LibraryState) -> TestServer {
        let app = Router::new()
            .route(endpoints::UPDATE_LIBRARY, post(update_library_endpoint))
            .with_state(state);

        TestServer::new(app)
    }

    #[test]
    fn versions_are_normalized() {
        assert_eq!(validate_library_version(" v6.2.1 "), Ok("6.2.1".to_owned()));
        assert_eq!(
            validate_library_version("7.0.0-beta.2"),
            Ok("7.0.0-beta.2".to_owned())
        );
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for version in ["", "6", "6.2", "6.2.x", "06.2.1", "6.2.1-", "6.2.1; rm -rf /", "latest"] {
            assert_eq!(
                validate_library_version(version),
                Err(Error::InvalidLibraryVersion(version.to_owned())),
                "{version:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn validate_only_does_not_install() {
        let installer = Arc::new(FakeInstaller::with_versions(&["6.2.1"]));
        let server = get_test_server(LibraryState::new(installer.clone()));

        let response = server
            .post(endpoints::UPDATE_LIBRARY)
            .json(&json!({"version": "6.2.1", "validateOnly": true}))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"version": "6.2.1", "validated": true, "installed": false}));
        assert!(installer.installed_versions().is_empty());
    }

    #[tokio::test]
    async fn second_phase_installs() {
        let installer = Arc::new(FakeInstaller::with_versions(&["6.2.1"]));
        let server = get_test_server(LibraryState::new(installer.clone()));

        let response = server
            .post(endpoints::UPDATE_LIBRARY)
            .json(&json!({"version": "v6.2.1"}))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"version": "6.2.1", "validated": true, "installed": true}));
        assert_eq!(installer.installed_versions(), vec!["6.2.1".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_version_fails_validation() {
        let installer = Arc::new(FakeInstaller::with_versions(&["6.2.1"]));
        let server = get_test_server(LibraryState::new(installer.clone()));

        let response = server
            .post(endpoints::UPDATE_LIBRARY)
            .json(&json!({"version": "9.9.9"}))
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        assert!(installer.installed_versions().is_empty());
    }

    #[tokio::test]
    async fn malformed_version_is_a_bad_request() {
        let server = get_test_server(LibraryState::new(Arc::new(FakeInstaller::default())));

        let response = server
            .post(endpoints::UPDATE_LIBRARY)
            .json(&json!({"version": "latest", "validateOnly": true}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn without_an_installer_the_updater_is_unavailable() {
        let server = get_test_server(LibraryState::default());

        let response = server
            .post(endpoints::UPDATE_LIBRARY)
            .json(&json!({"version": "6.2.1"}))
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn one_update_at_a_time() {
        let installer = Arc::new(
            FakeInstaller::with_versions(&["6.2.1"]).with_delay(Duration::from_secs(30)),
        );
        let state = LibraryState::new(installer);

        let (first, second) = tokio::join!(state.update("6.2.1", false), async {
            tokio::task::yield_now().await;
            state.update("6.2.1", false).await
        });

        assert!(first.is_ok());
        assert_eq!(second, Err(Error::LibraryUpdateInProgress));
    }
}
