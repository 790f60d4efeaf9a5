//! Stream events emitted during agent execution.
//!
//! Callers consume `(event, name)` pairs: `on_custom_event/final_message`,
//! `on_custom_event/review_transaction_text`, and
//! `on_custom_event/review_transaction_data`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

pub const EVENT_CUSTOM: &str = "on_custom_event";
pub const FINAL_MESSAGE: &str = "final_message";
pub const REVIEW_TEXT: &str = "review_transaction_text";
pub const REVIEW_DATA: &str = "review_transaction_data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChunk {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub chunk: EventChunk,
}

/// An event on the execution stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event: String,
    pub name: String,
    pub data: EventData,
}

impl AgentEvent {
    pub fn custom(name: &str, content: impl Into<String>) -> Self {
        Self {
            event: EVENT_CUSTOM.to_string(),
            name: name.to_string(),
            data: EventData {
                chunk: EventChunk {
                    content: content.into(),
                },
            },
        }
    }

    pub fn content(&self) -> &str {
        &self.data.chunk.content
    }
}

/// Stream of events produced by one `execute` call.
pub type EventStream = ReceiverStream<AgentEvent>;

/// Sending half handed to the execution graph.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Emit an event; a dropped receiver is not an error, the graph keeps
    /// running to completion so state stays consistent.
    pub async fn emit(&self, event: AgentEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver dropped; discarding event");
        }
    }
}
