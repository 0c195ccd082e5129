//! Event Ingress
//!
//! Events reach a worker through an [`EventSender`], a cloneable handle
//! over a bounded channel. Payloads are encoded to JSON when pushed and
//! decoded into the first step's input type when a run starts.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Result, WorkflowError};

/// An event delivered to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Key matched exactly against service bindings
    pub key: String,
    /// Encoded payload
    pub payload: Value,
    /// When the event was pushed
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Pushes events to a worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Encodes `payload` and queues it under `key`.
    ///
    /// Waits for buffer space when the queue is full. Fails with
    /// [`WorkflowError::WorkerStopped`] once the worker has begun
    /// shutting down.
    pub async fn push<T: Serialize>(&self, key: &str, payload: T) -> Result<()> {
        let payload =
            serde_json::to_value(payload).map_err(|e| WorkflowError::Encode(e.to_string()))?;
        self.push_event(Event::new(key, payload)).await
    }

    /// Queues an already built event.
    pub async fn push_event(&self, event: Event) -> Result<()> {
        debug!("Pushing event '{}'", event.key);
        self.tx
            .send(event)
            .await
            .map_err(|_| WorkflowError::WorkerStopped)
    }

    /// True once the worker no longer accepts events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct UserCreateEvent {
        username: String,
    }

    #[tokio::test]
    async fn test_push_encodes_payload() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .push(
                "user:create",
                UserCreateEvent {
                    username: "echo-test".to_string(),
                },
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "user:create");
        assert_eq!(event.payload, json!({"username": "echo-test"}));
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        drop(rx);

        assert!(sender.is_closed());
        assert_eq!(
            sender.push("evt", 1).await.unwrap_err(),
            WorkflowError::WorkerStopped
        );
    }

    #[tokio::test]
    async fn test_unencodable_payload() {
        use std::collections::HashMap;

        let (tx, _rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        assert!(matches!(
            sender.push("evt", bad).await,
            Err(WorkflowError::Encode(_))
        ));
    }
}
