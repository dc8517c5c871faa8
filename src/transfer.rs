//! Export and import of portable documents.
//!
//! Imported records always get fresh keys so they cannot clash with a
//! still-live original.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::keys::validate_category;
use crate::store::{encode_payload, Draft, WebhookStore};
use crate::types::{
    now_utc, ExportDocument, ExportedWebhook, ImportReport, ImportedWebhook, ItemFailure,
    EXPORT_VERSION,
};

impl WebhookStore {
    /// Snapshot every record of a category (or all). TTLs are as of now.
    pub async fn export(&self, category: Option<&str>) -> Result<ExportDocument> {
        if let Some(c) = category {
            validate_category(c)?;
        }
        let keys = self.scan_keys(category).await?;
        let records = self.fetch(keys).await?;

        let mut webhooks = Vec::with_capacity(records.len());
        for (key, record) in records {
            let ttl = self.kv.ttl(&self.codec.storage_key(&key)).await?.seconds();
            let callback_url = self.kv.get(&self.codec.callback_key(&key)).await?;
            webhooks.push(ExportedWebhook {
                key,
                ttl,
                created_at: record.created_at,
                category: record.category,
                payload: record.payload,
                callback_url,
            });
        }

        Ok(ExportDocument {
            version: EXPORT_VERSION.to_string(),
            exported_at: now_utc(),
            category: category.map(str::to_string),
            total_exported: webhooks.len(),
            webhooks,
        })
    }

    /// Restore the `webhooks` array of an export document. Items are
    /// validated one by one; a bad item is reported and skipped.
    pub async fn import(&self, document: &Value) -> Result<ImportReport> {
        let items = document
            .get("webhooks")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::InvalidInput("document must contain a webhooks array".into()))?;

        if let Some(version) = document.get("version").and_then(Value::as_str) {
            if version != EXPORT_VERSION {
                warn!(%version, "importing document with unknown version");
            }
        }

        let mut running = self.ledger.recalculate_if_stale(now_utc().timestamp()).await?;
        let mut report = ImportReport::default();

        for (index, item) in items.iter().enumerate() {
            match self.import_item(index, item, running).await {
                Ok(imported) => {
                    running += imported.1;
                    report.imported.push(imported.0);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.failed.push(ItemFailure::new(index, &e)),
            }
        }

        debug!(
            imported = report.imported.len(),
            failed = report.failed.len(),
            "import finished"
        );
        Ok(report)
    }

    async fn import_item(&self, index: usize, item: &Value, running: u64) -> Result<(ImportedWebhook, u64)> {
        let obj = item
            .as_object()
            .ok_or(StoreError::InvalidItemType { index })?;
        let payload = obj
            .get("payload")
            .filter(|p| !p.is_null())
            .cloned()
            .ok_or_else(|| StoreError::InvalidInput("missing required field: payload".into()))?;
        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StoreError::InvalidInput("missing required field: category".into()))?;
        validate_category(category)?;

        let ttl = self.resolve_ttl(obj.get("ttl").and_then(Value::as_i64), None);
        let created_at = obj
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(now_utc);
        let callback_url = obj
            .get("callback_url")
            .and_then(Value::as_str)
            .map(str::to_string);

        let bytes = encode_payload(&payload)?;
        let size = bytes.len() as u64;
        self.check_payload_size(size)?;
        self.check_quota(running, size)?;

        let created = self
            .insert(Draft {
                category: category.to_string(),
                payload,
                bytes,
                ttl,
                callback_url,
                marker: Some(format!("import-{index}")),
                created_at,
                replayed_from: None,
                original_created_at: None,
            })
            .await?;

        let imported = ImportedWebhook {
            index,
            original_key: obj.get("key").and_then(Value::as_str).map(str::to_string),
            key: created.key,
            category: created.category,
            ttl: created.ttl,
        };
        Ok((imported, size))
    }
}
