//! Debounced saving of settings edits.
//!
//! A settings form calls [AutoSaver::update] on every change. The saver waits
//! until the edits have been quiet for [AUTOSAVE_DEBOUNCE], then saves the
//! latest full settings object once. Saves run one at a time and each carries
//! a revision one greater than the last successful save.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};

use crate::{Error, settings::model::Settings};

/// How long edits must be quiet before they are saved.
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_secs(1);

/// The future returned by [SettingsSink::save].
pub type SaveFuture<'a> = Pin<Box<dyn Future<Output = Result<Settings, Error>> + Send + 'a>>;

/// Somewhere settings can be saved to, e.g. `PUT /api/settings`.
pub trait SettingsSink: Send + Sync + 'static {
    /// Save `settings`, returning what was stored.
    fn save<'a>(&'a self, settings: &'a Settings) -> SaveFuture<'a>;
}

/// The result of the most recent save attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Nothing has been saved yet.
    Idle,
    /// The settings were stored with this revision.
    Saved(u64),
    /// The save failed. It is not retried; the next edit triggers a new save.
    Failed(String),
}

/// Debounces settings edits into sequenced saves.
///
/// Dropping the saver cancels any pending save.
pub struct AutoSaver {
    edits: mpsc::UnboundedSender<Settings>,
    outcome: watch::Receiver<SaveOutcome>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    /// Start a saver for settings that were loaded as `loaded`.
    pub fn spawn(sink: Arc<dyn SettingsSink>, loaded: Settings) -> Self {
        let (edits, receiver) = mpsc::unbounded_channel();
        let (outcome_sender, outcome) = watch::channel(SaveOutcome::Idle);

        let task = tokio::spawn(run_saver(sink, loaded, receiver, outcome_sender));

        Self {
            edits,
            outcome,
            task,
        }
    }

    /// Record an edit. Only the latest edit within the debounce window is saved.
    pub fn update(&self, settings: Settings) {
        if self.edits.send(settings).is_err() {
            tracing::warn!("settings autosave task has stopped, dropping edit");
        }
    }

    /// The result of the most recent save attempt.
    pub fn outcome(&self) -> SaveOutcome {
        self.outcome.borrow().clone()
    }

    /// Watch save results as they happen.
    pub fn subscribe(&self) -> watch::Receiver<SaveOutcome> {
        self.outcome.clone()
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_saver(
    sink: Arc<dyn SettingsSink>,
    loaded: Settings,
    mut edits: mpsc::UnboundedReceiver<Settings>,
    outcome: watch::Sender<SaveOutcome>,
) {
    let mut saved = loaded;

    while let Some(mut latest) = edits.recv().await {
        // Keep taking edits until none arrives for a full debounce window.
        loop {
            tokio::select! {
                edit = edits.recv() => match edit {
                    Some(edit) => latest = edit,
                    None => return,
                },
                _ = sleep(AUTOSAVE_DEBOUNCE) => break,
            }
        }

        match (latest.snapshot(), saved.snapshot()) {
            (Ok(latest_snapshot), Ok(saved_snapshot)) if latest_snapshot == saved_snapshot => {
                tracing::debug!("settings unchanged since last save, skipping");
                continue;
            }
            (Err(error), _) | (_, Err(error)) => {
                tracing::error!("could not compare settings: {error}");
                continue;
            }
            _ => {}
        }

        latest.revision = saved.revision + 1;

        match sink.save(&latest).await {
            // Saves are sequential, but never let an older revision replace a newer one.
            Ok(stored) if stored.revision > saved.revision => {
                tracing::debug!("autosaved settings revision {}", stored.revision);
                let revision = stored.revision;
                saved = stored;
                outcome.send_replace(SaveOutcome::Saved(revision));
            }
            Ok(stored) => {
                tracing::warn!(
                    "ignoring save response for revision {} older than {}",
                    stored.revision,
                    saved.revision
                );
            }
            Err(Error::StaleSettingsRevision { stored, .. }) => {
                tracing::warn!("settings were saved elsewhere at revision {stored}");
                saved.revision = stored;
                outcome.send_replace(SaveOutcome::Failed(format!(
                    "settings were changed elsewhere (revision {stored})"
                )));
            }
            Err(error) => {
                tracing::error!("could not autosave settings: {error}");
                outcome.send_replace(SaveOutcome::Failed(error.to_string()));
            }
        }
    }
}
