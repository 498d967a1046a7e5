//! The interface to the process that talks to WhatsApp.
//!
//! [CommandBridge] runs an external program in two modes:
//! - `<program> pair` keeps running while a session is paired and prints one
//!   line per status change: `QR <payload>`, `READY` or `FAILED <reason>`.
//! - `<program> send <to>` reads the message from standard input and exits
//!   with a non-zero status if it could not be delivered.
//! - `<program> contacts` prints the paired account's contacts as a JSON
//!   array of `{name, number}` objects.
//!
//! Which backend the program uses and the Twilio credentials are passed as
//! environment variables.

use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    process::{Output, Stdio},
    sync::Mutex,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    sync::mpsc,
};

use crate::{
    Error,
    settings::{Settings, WhatsAppBackend},
};

/// How long sending one message may take.
const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// How long listing the contacts may take.
const CONTACTS_TIMEOUT: Duration = Duration::from_secs(30);

/// A contact of the paired WhatsApp account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// The name saved on the phone, if any.
    #[serde(default)]
    pub name: Option<String>,
    /// The phone number in international format.
    pub number: String,
}

/// A status change reported by the pairing process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A new QR code to scan with the phone.
    Qr(String),
    /// The session is paired and can send messages.
    Ready,
    /// Pairing failed or the session was lost.
    Failed(String),
}

/// Parse one line printed by the pairing process.
///
/// Lines that are not status lines, e.g. log output, yield `None`.
pub fn parse_bridge_line(line: &str) -> Option<BridgeEvent> {
    let line = line.trim();
    let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match keyword {
        "QR" if !rest.is_empty() => Some(BridgeEvent::Qr(rest.to_owned())),
        "READY" => Some(BridgeEvent::Ready),
        "FAILED" if rest.is_empty() => Some(BridgeEvent::Failed("unknown error".to_owned())),
        "FAILED" => Some(BridgeEvent::Failed(rest.to_owned())),
        _ => None,
    }
}

/// The backend and credentials the bridge should use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeConfig {
    /// Which WhatsApp integration to use.
    pub backend: WhatsAppBackend,
    /// The Twilio account, for the Twilio backend.
    pub twilio_account_sid: Option<String>,
    /// The Twilio token, for the Twilio backend.
    pub twilio_auth_token: Option<String>,
    /// The Twilio sender number, for the Twilio backend.
    pub twilio_from: Option<String>,
}

impl From<&Settings> for BridgeConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            backend: settings.whatsapp_backend,
            twilio_account_sid: settings.twilio_account_sid.clone(),
            twilio_auth_token: settings.twilio_auth_token.clone(),
            twilio_from: settings.twilio_from.clone(),
        }
    }
}

/// The future returned by [WhatsAppBridge] methods.
pub type BridgeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// The future returned by [WhatsAppBridge::contacts].
pub type ContactsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Contact>, Error>> + Send + 'a>>;

/// Sends WhatsApp messages and manages the paired session.
pub trait WhatsAppBridge: Send + Sync {
    /// Start pairing. Progress is reported on `events` after this returns.
    fn connect<'a>(
        &'a self,
        config: &'a BridgeConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> BridgeFuture<'a>;

    /// End the session.
    fn disconnect(&self) -> BridgeFuture<'_>;

    /// Send `message` to the phone number `to`.
    fn send<'a>(&'a self, config: &'a BridgeConfig, to: &'a str, message: &'a str)
    -> BridgeFuture<'a>;

    /// List the contacts of the paired account.
    fn contacts<'a>(&'a self, config: &'a BridgeConfig) -> ContactsFuture<'a>;
}

/// Runs an external WhatsApp bridge program.
#[derive(Debug)]
pub struct CommandBridge {
    program: PathBuf,
    pairing: Mutex<Option<Child>>,
}

impl CommandBridge {
    /// Create a bridge that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            pairing: Mutex::new(None),
        }
    }

    fn command(&self, config: &BridgeConfig) -> Command {
        let mut command = Command::new(&self.program);
        command
            .env("WHATSAPP_BACKEND", config.backend.as_str())
            .kill_on_drop(true);

        for (name, value) in [
            ("TWILIO_ACCOUNT_SID", &config.twilio_account_sid),
            ("TWILIO_AUTH_TOKEN", &config.twilio_auth_token),
            ("TWILIO_FROM", &config.twilio_from),
        ] {
            if let Some(value) = value {
                command.env(name, value);
            }
        }

        command
    }

    fn spawn_error(&self, error: std::io::Error) -> Error {
        Error::WhatsAppBridgeError(format!("could not run {}: {error}", self.program.display()))
    }

    fn stop_pairing(&self) -> Result<(), Error> {
        let mut pairing = self
            .pairing
            .lock()
            .map_err(|_| Error::WhatsAppBridgeError("pairing state is poisoned".to_owned()))?;

        if let Some(mut child) = pairing.take() {
            if let Err(error) = child.start_kill() {
                tracing::warn!("could not stop the WhatsApp pairing process: {error}");
            }
        }

        Ok(())
    }
}

impl WhatsAppBridge for CommandBridge {
    fn connect<'a>(
        &'a self,
        config: &'a BridgeConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> BridgeFuture<'a> {
        Box::pin(async move {
            self.stop_pairing()?;

            let mut child = self
                .command(config)
                .arg("pair")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|error| self.spawn_error(error))?;

            let stdout = child.stdout.take().ok_or_else(|| {
                Error::WhatsAppBridgeError("pairing process has no stdout".to_owned())
            })?;

            tracing::info!(
                "started WhatsApp pairing with the {} backend",
                config.backend.as_str()
            );

            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();

                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if let Some(event) = parse_bridge_line(&line) {
                                if events.send(event).is_err() {
                                    break;
                                }
                            } else {
                                tracing::debug!("WhatsApp bridge: {line}");
                            }
                        }
                        Ok(None) => {
                            let _ = events.send(BridgeEvent::Failed(
                                "the bridge process exited".to_owned(),
                            ));
                            break;
                        }
                        Err(error) => {
                            let _ = events.send(BridgeEvent::Failed(error.to_string()));
                            break;
                        }
                    }
                }
            });

            let mut pairing = self
                .pairing
                .lock()
                .map_err(|_| Error::WhatsAppBridgeError("pairing state is poisoned".to_owned()))?;
            *pairing = Some(child);

            Ok(())
        })
    }

    fn disconnect(&self) -> BridgeFuture<'_> {
        Box::pin(async move {
            tracing::info!("disconnecting WhatsApp session");
            self.stop_pairing()
        })
    }

    fn send<'a>(
        &'a self,
        config: &'a BridgeConfig,
        to: &'a str,
        message: &'a str,
    ) -> BridgeFuture<'a> {
        Box::pin(async move {
            let mut child = self
                .command(config)
                .arg("send")
                .arg(to)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|error| self.spawn_error(error))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(message.as_bytes())
                    .await
                    .map_err(|error| Error::WhatsAppBridgeError(error.to_string()))?;
            }

            let output = tokio::time::timeout(SEND_TIMEOUT, child.wait_with_output())
                .await
                .map_err(|_| Error::WhatsAppBridgeError("sending timed out".to_owned()))?
                .map_err(|error| Error::WhatsAppBridgeError(error.to_string()))?;

            if !output.status.success() {
                return Err(Error::WhatsAppBridgeError(failure_reason(&output)));
            }

            tracing::info!("sent WhatsApp message to {to}");
            Ok(())
        })
    }

    fn contacts<'a>(&'a self, config: &'a BridgeConfig) -> ContactsFuture<'a> {
        Box::pin(async move {
            let mut command = self.command(config);
            command
                .arg("contacts")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let output = tokio::time::timeout(CONTACTS_TIMEOUT, command.output())
                .await
                .map_err(|_| Error::WhatsAppBridgeError("listing contacts timed out".to_owned()))?
                .map_err(|error| self.spawn_error(error))?;

            if !output.status.success() {
                return Err(Error::WhatsAppBridgeError(failure_reason(&output)));
            }

            parse_contacts(&output.stdout)
        })
    }
}

/// The last non-blank line the bridge printed to stderr, or its exit status.
fn failure_reason(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("exited with {}", output.status))
}

/// Parse the contacts printed by `<program> contacts`, sorted by name then number.
///
/// Contacts without a number are dropped.
fn parse_contacts(stdout: &[u8]) -> Result<Vec<Contact>, Error> {
    let mut contacts: Vec<Contact> = serde_json::from_slice(stdout).map_err(|error| {
        Error::WhatsAppBridgeError(format!("invalid contacts output: {error}"))
    })?;

    contacts.retain(|contact| !contact.number.trim().is_empty());
    contacts.sort_by(|a, b| (&a.name, &a.number).cmp(&(&b.name, &b.number)));

    Ok(contacts)
}

#[cfg(test)]
mod tests {
    use crate::settings::{Settings, WhatsAppBackend};

    use crate::Error;

    use super::{BridgeConfig, BridgeEvent, Contact, parse_bridge_line, parse_contacts};

    #[test]
    fn parses_status_lines() {
        assert_eq!(
            parse_bridge_line("QR 2@abc,def==\n"),
            Some(BridgeEvent::Qr("2@abc,def==".to_owned()))
        );
        assert_eq!(parse_bridge_line("READY"), Some(BridgeEvent::Ready));
        assert_eq!(
            parse_bridge_line("FAILED auth timeout"),
            Some(BridgeEvent::Failed("auth timeout".to_owned()))
        );
    }

    #[test]
    fn ignores_log_lines() {
        assert_eq!(parse_bridge_line("[info] launching browser"), None);
        assert_eq!(parse_bridge_line("QR"), None);
        assert_eq!(parse_bridge_line(""), None);
    }

    #[test]
    fn parses_contacts_sorted_and_without_blank_numbers() {
        let contacts = parse_contacts(
            br#"[
                {"name": "Noa", "number": "+972501112222"},
                {"number": "+972503334444"},
                {"name": "Avi", "number": " "},
                {"name": "Dana", "number": "+972505556666", "isBusiness": false}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            contacts,
            vec![
                Contact {
                    name: None,
                    number: "+972503334444".to_owned()
                },
                Contact {
                    name: Some("Dana".to_owned()),
                    number: "+972505556666".to_owned()
                },
                Contact {
                    name: Some("Noa".to_owned()),
                    number: "+972501112222".to_owned()
                },
            ]
        );
    }

    #[test]
    fn invalid_contacts_output_is_a_bridge_error() {
        assert!(matches!(
            parse_contacts(b"not json"),
            Err(Error::WhatsAppBridgeError(_))
        ));
    }

    #[test]
    fn config_comes_from_settings() {
        let settings = Settings {
            whatsapp_backend: WhatsAppBackend::Twilio,
            twilio_from: Some("+15550001".to_owned()),
            ..Settings::default()
        };

        let config = BridgeConfig::from(&settings);

        assert_eq!(config.backend, WhatsAppBackend::Twilio);
        assert_eq!(config.twilio_from.as_deref(), Some("+15550001"));
        assert_eq!(config.twilio_auth_token, None);
    }
}
