//! Daily spending summaries over WhatsApp.
//!
//! Messages are delivered by an external bridge program, either through a
//! paired WhatsApp Web session or through Twilio.

mod bridge;
mod endpoints;
mod session;
mod summary;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::Error;

pub use bridge::{
    BridgeConfig, BridgeEvent, BridgeFuture, CommandBridge, Contact, ContactsFuture,
    WhatsAppBridge,
};
pub use endpoints::{
    SendResponse, disconnect_endpoint, get_contacts_endpoint, get_qr_endpoint,
    get_status_endpoint, send_daily_summary, send_message_endpoint, send_test_summary_endpoint,
    set_status_endpoint,
};
pub use session::{ConnectionId, SessionState, WhatsAppSession, WhatsAppStatus};
pub use summary::{build_current_summary, compose_summary};

/// The bridge and the session it drives.
#[derive(Clone)]
pub struct WhatsAppState {
    /// Delivers messages and pairs sessions.
    pub bridge: Arc<dyn WhatsAppBridge>,
    /// Updated by the task that listens to the bridge.
    pub session: Arc<Mutex<WhatsAppSession>>,
}

impl WhatsAppState {
    /// Create the state for `bridge` with no session.
    pub fn new(bridge: Arc<dyn WhatsAppBridge>) -> Self {
        Self {
            bridge,
            session: Arc::new(Mutex::new(WhatsAppSession::default())),
        }
    }

    /// A copy of the current session.
    ///
    /// # Errors
    /// Returns an error if the session lock is poisoned.
    pub fn session(&self) -> Result<WhatsAppSession, Error> {
        self.session
            .lock()
            .map(|session| session.clone())
            .map_err(|_| Error::WhatsAppBridgeError("session state is poisoned".to_owned()))
    }

    fn update_session<T>(&self, update: impl FnOnce(&mut WhatsAppSession) -> T) -> Option<T> {
        match self.session.lock() {
            Ok(mut session) => Some(update(&mut session)),
            Err(error) => {
                tracing::error!("could not update WhatsApp session: {error}");
                None
            }
        }
    }

    /// Start pairing and follow the bridge's progress in the background.
    ///
    /// The session is `initializing` as soon as this is called. Events still
    /// arriving from an earlier pairing are dropped.
    ///
    /// # Errors
    /// Returns an error if the bridge could not be started.
    pub async fn connect(&self, config: &BridgeConfig) -> Result<(), Error> {
        let connection = self
            .update_session(WhatsAppSession::start_connecting)
            .ok_or_else(|| Error::WhatsAppBridgeError("session state is poisoned".to_owned()))?;

        let (sender, mut receiver) = mpsc::unbounded_channel();
        if let Err(error) = self.bridge.connect(config, sender).await {
            self.update_session(|session| {
                session.apply(connection, BridgeEvent::Failed(error.to_string()))
            });
            return Err(error);
        }

        let state = self.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                state.update_session(|session| session.apply(connection, event));
            }
        });

        Ok(())
    }

    /// End the session.
    ///
    /// # Errors
    /// Returns an error if the bridge could not be stopped.
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.update_session(WhatsAppSession::disconnect);
        self.bridge.disconnect().await
    }
}
