//! Stores the settings as one row per field.
//!
//! Each value is the field's JSON encoding, so adding a field needs no migration.

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::{Error, settings::model::Settings};

/// Create the setting table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_settings_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS setting (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

/// Load the stored settings, filling in defaults for fields that were never saved.
///
/// # Errors
/// Returns an error if there is an SQL error or a stored value is not valid JSON.
pub fn get_settings(connection: &Connection) -> Result<Settings, Error> {
    let mut fields = match serde_json::to_value(Settings::default())? {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };

    let mut stmt = connection.prepare("SELECT key, value FROM setting")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    for row in rows {
        let (key, value) = row?;
        fields.insert(key, serde_json::from_str(&value)?);
    }

    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Store `settings` if its revision is newer than the stored revision.
///
/// # Errors
/// Returns:
/// - [Error::InvalidSetting] if a field is out of range,
/// - [Error::StaleSettingsRevision] if `settings.revision` is not greater than
///   the stored revision,
/// - or [Error::SqlError] if there is an SQL error.
pub fn save_settings(settings: &Settings, connection: &Connection) -> Result<Settings, Error> {
    settings.validate()?;

    let transaction = connection.unchecked_transaction()?;

    let stored = get_settings(&transaction)?.revision;
    if settings.revision <= stored {
        return Err(Error::StaleSettingsRevision {
            submitted: settings.revision,
            stored,
        });
    }

    if let Value::Object(fields) = serde_json::to_value(settings)? {
        let mut stmt = transaction.prepare(
            "INSERT INTO setting (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )?;

        for (key, value) in fields {
            stmt.execute((key, value.to_string()))?;
        }
    }

    transaction.commit()?;

    Ok(settings.clone())
}
