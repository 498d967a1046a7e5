use serde::{Deserialize, Serialize};

use crate::{
    Error,
    currency::DEFAULT_CURRENCY_SYMBOL,
    period::{CALENDAR_MONTH_START_DAY, MAX_BILLING_CYCLE_START_DAY},
};

/// How WhatsApp messages are delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhatsAppBackend {
    /// The Twilio messaging API, using the `twilio_*` credentials.
    Twilio,
    /// A WhatsApp Web session paired by scanning a QR code.
    #[default]
    Webjs,
}

impl WhatsAppBackend {
    /// The name used in settings and status responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            WhatsAppBackend::Twilio => "twilio",
            WhatsAppBackend::Webjs => "webjs",
        }
    }
}

/// The user-editable configuration of the app.
///
/// Missing fields take their default values when deserializing and unknown
/// fields are ignored, so settings stored by an older version still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Increases with every save. A save must carry a revision greater than
    /// the stored one.
    pub revision: u64,

    /// Whether the daily background sync runs.
    pub sync_enabled: bool,
    /// The local hour (0-23) the daily sync runs at.
    pub sync_hour: u8,
    /// How many days of history each sync asks the scraper for.
    pub sync_days_back: u16,
    /// The scraper vendor ids to sync, e.g. "isracard" or "hapoalim".
    pub sync_vendors: Vec<String>,
    /// Seconds to wait between scraping two vendors.
    pub scrape_delay_seconds: u64,
    /// Seconds a single scrape may take before it is abandoned.
    pub scraper_timeout_seconds: u64,
    /// How many times a failed scrape is retried.
    pub scraper_retries: u32,

    /// The day of the month reporting periods start on. 1 means calendar months.
    pub billing_cycle_start_day: u8,
    /// Whether the scraper should show its browser window.
    pub show_browser: bool,
    /// Prefix for formatted amounts.
    pub currency_symbol: String,
    /// Key for the AI categorization service.
    pub ai_api_key: Option<String>,

    /// Whether the daily WhatsApp summary is sent.
    pub whatsapp_enabled: bool,
    /// How WhatsApp messages are delivered.
    pub whatsapp_backend: WhatsAppBackend,
    /// The recipient phone number of the summaries.
    pub whatsapp_to: Option<String>,
    /// The local hour (0-23) the daily summary is sent at.
    pub whatsapp_hour: u8,
    /// Twilio account SID.
    pub twilio_account_sid: Option<String>,
    /// Twilio auth token.
    pub twilio_auth_token: Option<String>,
    /// The Twilio WhatsApp sender number.
    pub twilio_from: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            revision: 0,
            sync_enabled: false,
            sync_hour: 6,
            sync_days_back: 30,
            sync_vendors: Vec::new(),
            scrape_delay_seconds: 10,
            scraper_timeout_seconds: 300,
            scraper_retries: 2,
            billing_cycle_start_day: CALENDAR_MONTH_START_DAY,
            show_browser: false,
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_owned(),
            ai_api_key: None,
            whatsapp_enabled: false,
            whatsapp_backend: WhatsAppBackend::default(),
            whatsapp_to: None,
            whatsapp_hour: 20,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from: None,
        }
    }
}

/// Field names whose values must never be written to the logs.
pub const SECRET_SETTINGS: [&str; 2] = ["ai_api_key", "twilio_auth_token"];

impl Settings {
    /// Check that every field is within its allowed range.
    ///
    /// # Errors
    /// Returns [Error::InvalidSetting] naming the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sync_hour > 23 {
            return Err(Error::InvalidSetting(format!(
                "sync_hour must be between 0 and 23, got {}",
                self.sync_hour
            )));
        }

        if self.whatsapp_hour > 23 {
            return Err(Error::InvalidSetting(format!(
                "whatsapp_hour must be between 0 and 23, got {}",
                self.whatsapp_hour
            )));
        }

        if !(1..=365).contains(&self.sync_days_back) {
            return Err(Error::InvalidSetting(format!(
                "sync_days_back must be between 1 and 365, got {}",
                self.sync_days_back
            )));
        }

        if self.scraper_timeout_seconds == 0 {
            return Err(Error::InvalidSetting(
                "scraper_timeout_seconds must be greater than zero".to_owned(),
            ));
        }

        if self.scraper_retries > 10 {
            return Err(Error::InvalidSetting(format!(
                "scraper_retries must be at most 10, got {}",
                self.scraper_retries
            )));
        }

        if !(CALENDAR_MONTH_START_DAY..=MAX_BILLING_CYCLE_START_DAY)
            .contains(&self.billing_cycle_start_day)
        {
            return Err(Error::InvalidSetting(format!(
                "billing_cycle_start_day must be between 1 and {MAX_BILLING_CYCLE_START_DAY}, got {}",
                self.billing_cycle_start_day
            )));
        }

        if self.sync_vendors.iter().any(|vendor| vendor.trim().is_empty()) {
            return Err(Error::InvalidSetting(
                "sync_vendors cannot contain empty names".to_owned(),
            ));
        }

        if self.currency_symbol.trim().is_empty() {
            return Err(Error::InvalidSetting(
                "currency_symbol cannot be empty".to_owned(),
            ));
        }

        Ok(())
    }

    /// The settings as JSON, without the revision.
    ///
    /// Two settings with equal snapshots differ at most in their revision.
    pub fn snapshot(&self) -> Result<String, Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("revision");
        }

        Ok(value.to_string())
    }
}
