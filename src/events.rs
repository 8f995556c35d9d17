//! Realtime change notifications.
//!
//! Handlers publish an event after every successful mutation; the `/api/events`
//! endpoint subscribes and forwards the caller's own events as Server-Sent Events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Large enough to absorb a bulk operation without lagging subscribers.
const CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    #[serde(rename = "todo.created")]
    TodoCreated,
    #[serde(rename = "todo.updated")]
    TodoUpdated,
    #[serde(rename = "todo.deleted")]
    TodoDeleted,
    #[serde(rename = "todo.restored")]
    TodoRestored,
    #[serde(rename = "todos.bulk_updated")]
    TodosBulkUpdated,
    #[serde(rename = "category.changed")]
    CategoryChanged,
    #[serde(rename = "tag.changed")]
    TagChanged,
    #[serde(rename = "export.completed")]
    ExportCompleted,
    #[serde(rename = "export.failed")]
    ExportFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TodoCreated => "todo.created",
            EventKind::TodoUpdated => "todo.updated",
            EventKind::TodoDeleted => "todo.deleted",
            EventKind::TodoRestored => "todo.restored",
            EventKind::TodosBulkUpdated => "todos.bulk_updated",
            EventKind::CategoryChanged => "category.changed",
            EventKind::TagChanged => "tag.changed",
            EventKind::ExportCompleted => "export.completed",
            EventKind::ExportFailed => "export.failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub user_id: i32,
    /// Id of the todo, category, tag or export the event is about.
    pub resource_id: Option<Uuid>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Formats the event as one SSE frame.
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.kind.as_str(), data)
    }
}

/// Fan-out of events to every connected stream.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(
        &self,
        kind: EventKind,
        user_id: i32,
        resource_id: Option<Uuid>,
        payload: Value,
    ) {
        let event = Event {
            kind,
            user_id,
            resource_id,
            payload,
            timestamp: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    /// Serializes `payload`; serialization failures publish `null` rather than dropping the event.
    pub fn publish_json<T: Serialize>(
        &self,
        kind: EventKind,
        user_id: i32,
        resource_id: Option<Uuid>,
        payload: &T,
    ) {
        let payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        self.publish(kind, user_id, resource_id, payload);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
