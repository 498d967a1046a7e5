//! The state of the paired WhatsApp session as seen by the server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{settings::WhatsAppBackend, whatsapp::bridge::BridgeEvent};

/// How often clients should poll the status while pairing is in progress.
pub const PAIRING_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// How often clients should poll the status otherwise.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10000);

/// Where the session is in its lifecycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session and no pairing in progress.
    #[default]
    Disconnected,
    /// The bridge is starting.
    Initializing,
    /// Waiting for the user to scan the QR code.
    AwaitingQr,
    /// Paired and able to send.
    Ready,
    /// Pairing failed or the session was lost.
    Failed,
}

/// Identifies one pairing attempt.
///
/// Every connect and disconnect starts a new attempt, so events from a
/// replaced pairing process can be told apart from the current one.
pub type ConnectionId = u64;

/// The WhatsApp session and its latest QR code.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WhatsAppSession {
    state: SessionState,
    qr: Option<String>,
    error: Option<String>,
    connection: ConnectionId,
}

/// The body of the status routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsAppStatus {
    /// The configured backend.
    pub backend: WhatsAppBackend,
    /// The session state.
    pub state: SessionState,
    /// The QR code to scan, while awaiting one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// Why the session failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the client should ask again.
    pub poll_interval_ms: u64,
}

impl WhatsAppSession {
    /// The session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The QR code waiting to be scanned.
    pub fn qr(&self) -> Option<&str> {
        self.qr.as_deref()
    }

    /// Pairing was requested. Returns the attempt that later events must belong to.
    pub fn start_connecting(&mut self) -> ConnectionId {
        self.connection += 1;
        self.state = SessionState::Initializing;
        self.qr = None;
        self.error = None;
        self.connection
    }

    /// The session was ended by the user.
    pub fn disconnect(&mut self) {
        self.connection += 1;
        self.state = SessionState::Disconnected;
        self.qr = None;
        self.error = None;
    }

    /// Apply a status change reported by the pairing attempt `connection`.
    ///
    /// Events from an attempt that was since replaced or disconnected belong
    /// to a stopped pairing process and are ignored.
    pub fn apply(&mut self, connection: ConnectionId, event: BridgeEvent) {
        if connection != self.connection || self.state == SessionState::Disconnected {
            tracing::debug!("ignoring WhatsApp event from a stopped pairing: {event:?}");
            return;
        }

        match event {
            BridgeEvent::Qr(qr) => {
                self.state = SessionState::AwaitingQr;
                self.qr = Some(qr);
            }
            BridgeEvent::Ready => {
                self.state = SessionState::Ready;
                self.qr = None;
                self.error = None;
            }
            BridgeEvent::Failed(reason) => {
                tracing::warn!("WhatsApp session failed: {reason}");
                self.state = SessionState::Failed;
                self.qr = None;
                self.error = Some(reason);
            }
        }
    }

    /// How long the client should wait before polling the status again.
    pub fn poll_interval(&self) -> Duration {
        match self.state {
            SessionState::Initializing | SessionState::AwaitingQr => PAIRING_POLL_INTERVAL,
            _ => IDLE_POLL_INTERVAL,
        }
    }

    /// The status response for `backend`.
    pub fn status(&self, backend: WhatsAppBackend) -> WhatsAppStatus {
        WhatsAppStatus {
            backend,
            state: self.state,
            qr: self.qr.clone(),
            error: self.error.clone(),
            poll_interval_ms: self.poll_interval().as_millis() as u64,
        }
    }
}
