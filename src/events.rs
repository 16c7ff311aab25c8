//! Notifications delivered to whatever shell embeds the reader.

use std::path::Path;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::IdentityRecord;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct ReadCompletedEvent {
    pub record: IdentityRecord,
    pub file_path: Option<String>,
    pub success: bool,
}

impl ReadCompletedEvent {
    pub fn new(record: IdentityRecord, file_path: Option<&Path>) -> Self {
        Self {
            record,
            file_path: file_path.map(|path| path.display().to_string()),
            success: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ReaderEvent {
    ReadCompleted(ReadCompletedEvent),
    AutoReadStarted,
    AutoReadCompleted(ReadCompletedEvent),
    AutoReadError(String),
    CardRemoved,
    AutoReadStatusChanged(bool),
}

impl ReaderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReaderEvent::ReadCompleted(_) => "read-completed",
            ReaderEvent::AutoReadStarted => "auto-read-started",
            ReaderEvent::AutoReadCompleted(_) => "auto-read-completed",
            ReaderEvent::AutoReadError(_) => "auto-read-error",
            ReaderEvent::CardRemoved => "card-removed",
            ReaderEvent::AutoReadStatusChanged(_) => "auto-read-status-changed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ReaderEvent);
}

/// Fan-out of [`ReaderEvent`]s to any number of subscribers.
///
/// Emitting with no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ReaderEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: ReaderEvent) {
        let _ = self.sender.send(event);
    }
}
