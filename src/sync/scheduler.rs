//! Runs the daily sync and the daily WhatsApp summary at the configured hours.

use std::time::Duration;

use time::{Date, OffsetDateTime};
use tokio::task::JoinHandle;

use crate::{
    AppState,
    settings::{Settings, get_settings},
    sync::runner::SyncOptions,
    timezone::local_now,
    whatsapp::send_daily_summary,
};

/// How often the scheduler checks whether a job is due.
pub const SCHEDULER_TICK: Duration = Duration::from_secs(60);

/// A scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Scrape and import every configured vendor.
    Sync,
    /// Send the spending summary over WhatsApp.
    WhatsAppSummary,
}

/// The local date each job last ran on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LastRuns {
    sync: Option<Date>,
    whatsapp_summary: Option<Date>,
}

/// The jobs that are due at local time `now`, marking them as run today.
///
/// A job is due once per day, during its configured hour.
pub fn due_jobs(settings: &Settings, now: OffsetDateTime, last_runs: &mut LastRuns) -> Vec<Job> {
    let today = now.date();
    let hour = now.hour();
    let mut jobs = Vec::new();

    if settings.sync_enabled && hour == settings.sync_hour && last_runs.sync != Some(today) {
        last_runs.sync = Some(today);
        jobs.push(Job::Sync);
    }

    if settings.whatsapp_enabled
        && hour == settings.whatsapp_hour
        && last_runs.whatsapp_summary != Some(today)
    {
        last_runs.whatsapp_summary = Some(today);
        jobs.push(Job::WhatsAppSummary);
    }

    jobs
}

/// Start the scheduler in the background.
///
/// Settings are reread on every tick, so changes take effect without a restart.
pub fn spawn_scheduler(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCHEDULER_TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_runs = LastRuns::default();

        loop {
            interval.tick().await;

            let settings = {
                let connection = match state.db_connection.lock() {
                    Ok(connection) => connection,
                    Err(error) => {
                        tracing::error!("could not acquire database lock: {error}");
                        continue;
                    }
                };

                match get_settings(&connection) {
                    Ok(settings) => settings,
                    Err(error) => {
                        tracing::error!("scheduler could not read settings: {error}");
                        continue;
                    }
                }
            };

            let now = match local_now(&state.local_timezone) {
                Ok(now) => now,
                Err(error) => {
                    tracing::error!("scheduler could not get the local time: {error}");
                    continue;
                }
            };

            for job in due_jobs(&settings, now, &mut last_runs) {
                run_job(job, &state, &settings, now.date()).await;
            }
        }
    })
}

async fn run_job(job: Job, state: &AppState, settings: &Settings, today: Date) {
    match job {
        Job::Sync => {
            tracing::info!("starting scheduled sync");
            if let Err(error) = state.sync.spawn(
                state.db_connection.clone(),
                state.events.clone(),
                SyncOptions::from_settings(settings, &state.local_timezone),
                today,
            ) {
                tracing::warn!("skipped scheduled sync: {error}");
            }
        }
        Job::WhatsAppSummary => {
            tracing::info!("sending scheduled WhatsApp summary");
            if let Err(error) =
                send_daily_summary(&state.db_connection, &state.local_timezone, &state.whatsapp)
                    .await
            {
                tracing::error!("could not send scheduled WhatsApp summary: {error}");
            }
        }
    }
}
