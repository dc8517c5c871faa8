use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::kv::KvStore;
use crate::types::now_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "webhook.created")]
    Created,
    #[serde(rename = "webhook.updated")]
    Updated,
    #[serde(rename = "webhook.deleted")]
    Deleted,
    #[serde(rename = "webhook.replayed")]
    Replayed,
}

/// Lifecycle notification as published to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Fire-and-forget publisher. A failed publish is logged and dropped; the
/// mutation that triggered it has already happened.
#[derive(Clone)]
pub struct EventPublisher {
    kv: Arc<dyn KvStore>,
    channel: String,
}

impl EventPublisher {
    pub fn new(kv: Arc<dyn KvStore>, channel: impl Into<String>) -> Self {
        Self {
            kv,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn publish(&self, kind: EventKind, data: Value) {
        let event = WebhookEvent {
            kind,
            timestamp: now_utc(),
            data,
        };
        let message = match serde_json::to_string(&event) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, ?kind, "failed to encode event");
                return;
            }
        };
        if let Err(e) = self.kv.publish(&self.channel, &message).await {
            warn!(error = %e, ?kind, channel = %self.channel, "failed to publish event");
        }
    }
}
