//! The settings bag: scraper and sync options, display options and the
//! WhatsApp channel configuration. Also updates the scraper library.

mod autosave;
mod db;
mod endpoints;
mod library;
mod model;

pub use autosave::{AUTOSAVE_DEBOUNCE, AutoSaver, SaveFuture, SaveOutcome, SettingsSink};
pub use db::{create_settings_table, get_settings, save_settings};
pub use endpoints::{get_settings_endpoint, put_settings_endpoint};
pub use library::{
    CommandInstaller, InstallFuture, LibraryInstaller, LibraryState, UpdateLibraryRequest,
    UpdateLibraryResponse, update_library_endpoint, validate_library_version,
};
pub use model::{SECRET_SETTINGS, Settings, WhatsAppBackend};
