//! Listing, search and statistics. All of these are full scans over the
//! record namespace; there is no secondary index.

use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::keys::{parse_key, validate_category};
use crate::store::WebhookStore;
use crate::types::{now_utc, RecordRef, StoreStats, StoredRecord, WebhookSummary};

impl WebhookStore {
    /// External keys of live records, newest first.
    pub(crate) async fn scan_keys(&self, category: Option<&str>) -> Result<Vec<String>> {
        let scanned = self.kv.keys(&self.codec.scan_pattern(category)).await?;
        let mut keys = self.codec.record_keys(scanned);
        // Timestamps are fixed-width decimals, so lexicographic order is
        // chronological within a category.
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    /// Read and decode records. Keys that vanished since the scan are
    /// skipped, as are values that no longer decode.
    pub(crate) async fn fetch(&self, keys: Vec<String>) -> Result<Vec<(String, StoredRecord)>> {
        let storage_keys: Vec<String> = keys.iter().map(|k| self.codec.storage_key(k)).collect();
        let values = self.kv.get_many(&storage_keys).await?;

        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, raw)| {
                let raw = raw?;
                match StoredRecord::decode(&raw) {
                    Ok(record) => Some((key, record)),
                    Err(e) => {
                        warn!(%key, error = %e, "skipping corrupt record");
                        None
                    }
                }
            })
            .collect())
    }

    async fn summarize(&self, records: Vec<(String, StoredRecord)>) -> Result<Vec<WebhookSummary>> {
        let mut out = Vec::with_capacity(records.len());
        for (key, record) in records {
            let ttl = self.kv.ttl(&self.codec.storage_key(&key)).await?;
            if ttl == crate::kv::KeyTtl::Missing {
                continue;
            }
            out.push(WebhookSummary {
                key,
                category: record.category,
                created_at: record.created_at,
                ttl: ttl.seconds(),
                payload: record.payload,
            });
        }
        Ok(out)
    }

    /// Records of one category (or all), optionally created at or after `since`.
    pub async fn list(&self, category: Option<&str>, since: Option<i64>) -> Result<Vec<WebhookSummary>> {
        if let Some(c) = category {
            validate_category(c)?;
        }
        let mut keys = self.scan_keys(category).await?;
        if let Some(since) = since {
            keys.retain(|k| parse_key(k).is_some_and(|p| p.timestamp >= since));
        }
        let records = self.fetch(keys).await?;
        self.summarize(records).await
    }

    /// Case-insensitive substring match over every serialized payload.
    pub async fn search(&self, query: &str) -> Result<Vec<WebhookSummary>> {
        if query.trim().is_empty() {
            return Err(StoreError::InvalidInput("search query must not be empty".into()));
        }
        let needle = query.to_lowercase();

        let keys = self.scan_keys(None).await?;
        let matches: Vec<(String, StoredRecord)> = self
            .fetch(keys)
            .await?
            .into_iter()
            .filter(|(_, record)| {
                serde_json::to_string(&record.payload)
                    .map(|s| s.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect();
        self.summarize(matches).await
    }

    /// Aggregate counts. The byte total may be up to one recompute interval stale.
    pub async fn stats(&self) -> Result<StoreStats> {
        let keys = self.scan_keys(None).await?;
        let total_size_bytes = self.ledger.recalculate_if_stale(now_utc().timestamp()).await?;

        let mut total_webhooks: u64 = 0;
        let mut categories: BTreeMap<String, u64> = BTreeMap::new();
        let mut oldest: Option<RecordRef> = None;
        let mut newest: Option<RecordRef> = None;

        for key in &keys {
            let Some(parsed) = parse_key(key) else {
                continue;
            };
            total_webhooks += 1;
            *categories.entry(parsed.category.to_string()).or_default() += 1;

            let candidate = RecordRef {
                key: key.clone(),
                timestamp: parsed.timestamp,
            };
            if oldest.as_ref().map_or(true, |o| parsed.timestamp < o.timestamp) {
                oldest = Some(candidate.clone());
            }
            if newest.as_ref().map_or(true, |n| parsed.timestamp > n.timestamp) {
                newest = Some(candidate);
            }
        }

        Ok(StoreStats {
            total_webhooks,
            total_size_bytes,
            storage_limit_bytes: self.config.total_payload_limit,
            categories,
            oldest_webhook: oldest,
            newest_webhook: newest,
        })
    }
}
