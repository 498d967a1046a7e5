//! A typed publish/subscribe bus for telling clients that data changed.
//!
//! Handlers that mutate data publish an [AppEvent]; browsers subscribe through
//! the server-sent event stream at [crate::endpoints::EVENTS] and refetch.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{FromRef, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::AppState;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something changed that subscribers may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEvent {
    /// Transactions, budgets or categories changed; views should refetch.
    DataRefresh,
    /// Card nicknames or bank links changed.
    CardVendorsUpdated,
}

impl AppEvent {
    /// The SSE event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::DataRefresh => "data_refresh",
            AppEvent::CardVendorsUpdated => "card_vendors_updated",
        }
    }
}

/// Fan-out channel for [AppEvent]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl EventBus {
    /// Send `event` to every current subscriber.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: AppEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!("published {event:?} to {receivers} subscribers"),
            Err(_) => tracing::debug!("published {event:?} with no subscribers"),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl FromRef<AppState> for EventBus {
    fn from_ref(state: &AppState) -> Self {
        state.events.clone()
    }
}

/// A route handler that streams [AppEvent]s as server-sent events.
///
/// Subscribers that fall behind skip the missed events rather than
/// disconnecting; a missed refresh is covered by the next one.
pub async fn get_event_stream(
    State(events): State<EventBus>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(events.subscribe()).filter_map(|message| match message {
        Ok(event) => Some(Ok(Event::default().event(event.name()).data("{}"))),
        Err(error) => {
            tracing::warn!("event subscriber lagged: {error}");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
