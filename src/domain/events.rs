//! Signals the orchestration core emits while it works.
//!
//! Components never talk to a renderer directly. They emit [`ClientEvent`]s
//! through an [`EventSink`], and whoever owns the sink decides what to do
//! with them (log, forward over a channel, record in tests).

use serde::Serialize;

use super::negotiation::NegotiationState;

/// Slice of view state a refresh belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    Status,
    ActiveDownloads,
    Duplicates,
    Groups,
    Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A negotiation moved to a new state.
    Negotiation {
        book_id: String,
        state: NegotiationState,
    },
    /// A queue attempt ended without the book being queued or saved.
    QueueFailed {
        book_id: String,
        title: Option<String>,
        message: String,
    },
    /// A slice was replaced by a fresh full fetch.
    Refreshed { slice: Slice, count: usize },
    /// A refresh failed; the previously held slice is kept.
    RefreshFailed { slice: Slice, message: String },
    /// A user action (cancel, dismiss, review toggle, ...) was not accepted.
    ActionFailed {
        action: String,
        target: String,
        message: String,
    },
}

/// Port for emitting client events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent);
}

/// Writes every event to the tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ClientEvent) {
        match &event {
            ClientEvent::QueueFailed { .. }
            | ClientEvent::RefreshFailed { .. }
            | ClientEvent::ActionFailed { .. } => tracing::warn!(?event, "client event"),
            ClientEvent::Negotiation { .. } => tracing::info!(?event, "client event"),
            ClientEvent::Refreshed { .. } => tracing::debug!(?event, "client event"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ClientEvent::RefreshFailed {
            slice: Slice::ActiveDownloads,
            message: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "refresh_failed");
        assert_eq!(json["slice"], "active_downloads");
    }
}
