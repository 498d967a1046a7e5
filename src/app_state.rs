//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    db::initialize,
    events::EventBus,
    pagination::PaginationConfig,
    settings::{LibraryInstaller, LibraryState},
    sync::{Scraper, SyncState},
    whatsapp::{WhatsAppBridge, WhatsAppState},
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The local timezone as a canonical timezone name, e.g. "Asia/Jerusalem".
    pub local_timezone: String,

    /// The config that controls how reports are paged.
    pub pagination_config: PaginationConfig,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// Broadcasts data changes to subscribed clients.
    pub events: EventBus,

    /// The scraper used by background syncs and whether a sync is running.
    pub sync: SyncState,

    /// The WhatsApp bridge and the current pairing session.
    pub whatsapp: WhatsAppState,

    /// Installs new versions of the scraper library, if configured.
    pub library: LibraryState,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// `local_timezone` should be a valid, canonical timezone name, e.g. "Asia/Jerusalem".
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        local_timezone: &str,
        pagination_config: PaginationConfig,
        scraper: Arc<dyn Scraper>,
        whatsapp_bridge: Arc<dyn WhatsAppBridge>,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            local_timezone: local_timezone.to_owned(),
            pagination_config,
            db_connection: Arc::new(Mutex::new(db_connection)),
            events: EventBus::default(),
            sync: SyncState::new(scraper),
            whatsapp: WhatsAppState::new(whatsapp_bridge),
            library: LibraryState::default(),
        })
    }

    /// Enable the library updater with `installer`.
    pub fn with_library_installer(mut self, installer: Arc<dyn LibraryInstaller>) -> Self {
        self.library = LibraryState::new(installer);
        self
    }
}
