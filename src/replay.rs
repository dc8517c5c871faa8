use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::events::EventKind;
use crate::store::{encode_payload, Draft, WebhookStore};
use crate::types::{now_utc, ReplayOptions, ReplayedWebhook};

impl WebhookStore {
    /// Copy a record's payload into a new record. The source is left as is.
    pub async fn replay(&self, source_key: &str, options: ReplayOptions) -> Result<ReplayedWebhook> {
        let source = self.load(source_key).await?;

        let category = match options.category.as_deref() {
            Some(c) if !c.is_empty() => self.resolve_category(Some(c))?,
            _ => source.category.clone(),
        };
        let ttl = self.resolve_ttl(options.ttl, None);

        let bytes = encode_payload(&source.payload)?;
        let size = bytes.len() as u64;
        self.check_payload_size(size)?;
        let now = now_utc();
        let current = self.ledger.recalculate_if_stale(now.timestamp()).await?;
        self.check_quota(current, size)?;

        let created = self
            .insert(Draft {
                category,
                payload: source.payload,
                bytes,
                ttl,
                callback_url: None,
                marker: Some("replay".to_string()),
                created_at: now,
                replayed_from: Some(source_key.to_string()),
                original_created_at: Some(source.created_at),
            })
            .await?;
        debug!(from = %source_key, to = %created.key, "replayed webhook");

        let replayed = ReplayedWebhook {
            original_key: source_key.to_string(),
            new_key: created.key,
            category: created.category,
            ttl: created.ttl,
        };
        self.events
            .publish(
                EventKind::Replayed,
                json!({
                    "original_key": replayed.original_key,
                    "new_key": replayed.new_key,
                    "category": replayed.category,
                    "ttl": replayed.ttl,
                }),
            )
            .await;
        Ok(replayed)
    }
}
