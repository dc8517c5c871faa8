use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::{encode_payload, Draft, WebhookStore};
use crate::types::{now_utc, payload_ttl, BatchCreateReport, BatchDeleteReport, CreatedWebhook, ItemFailure};

impl WebhookStore {
    /// Store each item independently. Quota is checked against a local
    /// running total seeded from one ledger read, so earlier items in the
    /// batch reduce the headroom of later ones. Once an item breaches the
    /// quota, bytes it asked for stay counted, so every later item fails too.
    pub async fn batch_create(&self, category: Option<&str>, items: Vec<Value>) -> Result<BatchCreateReport> {
        if items.is_empty() {
            return Err(StoreError::InvalidInput("batch must contain at least one item".into()));
        }
        let category = self.resolve_category(category)?;
        let now = now_utc();
        let mut running = self.ledger.recalculate_if_stale(now.timestamp()).await?;
        let mut rejected: u64 = 0;
        let mut report = BatchCreateReport::default();

        for (index, item) in items.into_iter().enumerate() {
            match self.batch_item(&category, index, item, running + rejected).await {
                Ok(created) => {
                    running += created.size;
                    self.publish_created(&created).await;
                    report.success.push(created);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if let StoreError::StorageLimitExceeded { candidate, .. } = &e {
                        rejected += *candidate;
                    }
                    report.failed.push(ItemFailure::new(index, &e));
                }
            }
        }

        debug!(
            %category,
            created = report.success.len(),
            failed = report.failed.len(),
            "batch create finished"
        );
        Ok(report)
    }

    async fn batch_item(&self, category: &str, index: usize, item: Value, committed: u64) -> Result<CreatedWebhook> {
        if !item.is_object() {
            return Err(StoreError::InvalidItemType { index });
        }
        let bytes = encode_payload(&item)?;
        let size = bytes.len() as u64;
        self.check_payload_size(size)?;
        self.check_quota(committed, size)?;

        let ttl = self.resolve_ttl(None, payload_ttl(&item));
        self.insert(Draft {
            category: category.to_string(),
            payload: item,
            bytes,
            ttl,
            callback_url: None,
            marker: Some(index.to_string()),
            created_at: now_utc(),
            replayed_from: None,
            original_created_at: None,
        })
        .await
    }

    /// Delete each key independently; missing keys are reported, not fatal.
    pub async fn batch_delete(&self, keys: &[String]) -> Result<BatchDeleteReport> {
        let mut report = BatchDeleteReport::default();
        for key in keys {
            match self.delete(key).await {
                Ok(_) => report.deleted.push(key.clone()),
                Err(StoreError::NotFound(_)) => report.not_found.push(key.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}
