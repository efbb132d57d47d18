//! Per-user notification bus.
//!
//! Queue workers emit job outcomes; this bus routes them to the owning
//! user's broadcast channel, which the `/events/:native` SSE route drains.
//! Channels are created lazily on first subscription or first event and
//! dropped when nobody is listening.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::queue::JobOutcome;

const CHANNEL_CAPACITY: usize = 64;

/// Event pushed to a user's stream.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeEvent {
    pub id: String,
    pub topic: String,
    /// "completed" | "pending" | "failed"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BridgeEvent {
    fn from_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed {
                id, topic, result, ..
            } => BridgeEvent {
                id: id.clone(),
                topic: topic.to_string(),
                status: "completed".to_string(),
                result: Some(result.clone()),
                code: None,
                message: None,
            },
            JobOutcome::Failed {
                id,
                topic,
                code,
                message,
                ..
            } => {
                // Insufficient hot liquidity is not an error to the user: the
                // replacement job is the authoritative one.
                let status = if *code == "PendingLiquidity" {
                    "pending"
                } else {
                    "failed"
                };
                BridgeEvent {
                    id: id.clone(),
                    topic: topic.to_string(),
                    status: status.to_string(),
                    result: None,
                    code: Some(code.to_string()),
                    message: Some(message.clone()),
                }
            }
        }
    }
}

pub struct NotificationBus {
    channels: RwLock<HashMap<String, broadcast::Sender<BridgeEvent>>>,
}

impl NotificationBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe to a user's event stream.
    pub async fn subscribe(&self, native: &str) -> broadcast::Receiver<BridgeEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(native.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to a user's stream, if anyone is listening.
    pub async fn publish(&self, native: &str, event: BridgeEvent) {
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(native) {
            if sender.send(event).is_err() {
                // Last receiver gone; drop the channel
                channels.remove(native);
            }
        }
    }

    /// Pump queue outcomes into user streams until the queue closes.
    pub async fn run(self: Arc<Self>, mut outcomes: broadcast::Receiver<JobOutcome>) {
        loop {
            match outcomes.recv().await {
                Ok(outcome) => {
                    let native = match &outcome {
                        JobOutcome::Completed { native, .. } => native.clone(),
                        JobOutcome::Failed { native, .. } => native.clone(),
                    };
                    if let Some(native) = native {
                        self.publish(&native, BridgeEvent::from_outcome(&outcome)).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification bus lagged behind job outcomes");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("job outcome stream closed, notification bus stopping");
                    return;
                }
            }
        }
    }
}
