use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::events::{EventKind, EventPublisher};
use crate::keys::{parse_key, validate_category, KeyCodec};
use crate::kv::{KeyTtl, KvError, KvStore};
use crate::ledger::SizeLedger;
use crate::types::{
    charged_size, now_utc, payload_ttl, CallbackUpdate, CreatedWebhook, DeletedWebhook,
    NewWebhook, StoredRecord, UpdateChanges, Webhook, WebhookUpdate,
};

const MAX_KEY_PROBES: usize = 64;

/// Everything needed to write one record. Callers have already checked
/// size and quota.
pub(crate) struct Draft {
    pub category: String,
    pub payload: Value,
    pub bytes: Vec<u8>,
    pub ttl: u64,
    pub callback_url: Option<String>,
    pub marker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub replayed_from: Option<String>,
    pub original_created_at: Option<DateTime<Utc>>,
}

/// The storage engine: records, ledger, catalog and events over a
/// [`KvStore`]. Cheap to share behind an `Arc`.
pub struct WebhookStore {
    pub(crate) kv: Arc<dyn KvStore>,
    pub(crate) codec: KeyCodec,
    pub(crate) ledger: SizeLedger,
    pub(crate) events: EventPublisher,
    pub(crate) config: StoreConfig,
}

impl WebhookStore {
    pub fn new(kv: Arc<dyn KvStore>, config: StoreConfig) -> Self {
        let codec = KeyCodec::new(config.key_prefix.clone(), config.callback_prefix.clone());
        let ledger = SizeLedger::new(kv.clone(), codec.clone(), config.recalc_interval_secs);
        let events = EventPublisher::new(kv.clone(), config.events_channel.clone());
        Self {
            kv,
            codec,
            ledger,
            events,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SizeLedger {
        &self.ledger
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    // ─── Shared helpers ─────────────────────────────────────────────────────

    pub(crate) fn resolve_category(&self, category: Option<&str>) -> Result<String> {
        let category = match category {
            Some(c) if !c.is_empty() => c,
            _ => self.config.default_category.as_str(),
        };
        validate_category(category)?;
        Ok(category.to_string())
    }

    /// First positive TTL among the request value and the fallback, else the default.
    pub(crate) fn resolve_ttl(&self, requested: Option<i64>, fallback: Option<u64>) -> u64 {
        requested
            .filter(|t| *t > 0)
            .map(|t| t as u64)
            .or(fallback)
            .unwrap_or(self.config.default_ttl)
    }

    pub(crate) fn check_payload_size(&self, size: u64) -> Result<()> {
        if size > self.config.max_payload_bytes {
            return Err(StoreError::PayloadTooLarge {
                size,
                limit: self.config.max_payload_bytes,
            });
        }
        Ok(())
    }

    pub(crate) fn check_quota(&self, current: u64, size: u64) -> Result<()> {
        let limit = self.config.total_payload_limit;
        if current.saturating_add(size) > limit {
            return Err(StoreError::StorageLimitExceeded {
                current,
                candidate: size,
                limit,
            });
        }
        Ok(())
    }

    /// Generate a key that is not currently in use, adding a disambiguator
    /// when the plain one collides.
    async fn allocate_key(&self, category: &str, bytes: &[u8], marker: Option<&str>) -> Result<String> {
        let now = Utc::now().timestamp();
        let base = self.codec.generate_key(category, bytes, marker, now);
        if !self.kv.exists(&self.codec.storage_key(&base)).await? {
            return Ok(base);
        }
        for n in 1..=MAX_KEY_PROBES {
            let disambiguator = match marker {
                Some(m) => format!("{m}-{n}"),
                None => n.to_string(),
            };
            let key = self.codec.generate_key(category, bytes, Some(&disambiguator), now);
            if !self.kv.exists(&self.codec.storage_key(&key)).await? {
                return Ok(key);
            }
        }
        Err(KvError::Command(format!("no free key for {category} after {MAX_KEY_PROBES} probes")).into())
    }

    /// Write record, then callback, then credit the ledger. Not atomic as a
    /// unit: a crash in between can leave the callback unwritten. Ledger
    /// failures are logged, never returned.
    pub(crate) async fn insert(&self, draft: Draft) -> Result<CreatedWebhook> {
        let key = self
            .allocate_key(&draft.category, &draft.bytes, draft.marker.as_deref())
            .await?;
        let size = draft.bytes.len() as u64;
        let record = StoredRecord {
            created_at: draft.created_at,
            category: draft.category.clone(),
            payload: draft.payload,
            size: Some(size),
            replayed_from: draft.replayed_from,
            original_created_at: draft.original_created_at,
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| StoreError::InvalidInput(format!("payload is not serializable: {e}")))?;

        self.kv
            .set(&self.codec.storage_key(&key), &value, Some(draft.ttl))
            .await?;

        let callback_url = draft.callback_url.filter(|u| !u.is_empty());
        if let Some(url) = &callback_url {
            self.kv
                .set(&self.codec.callback_key(&key), url, Some(draft.ttl))
                .await?;
        }

        // Record is already written. A missed credit is drift until the next rescan.
        if let Err(e) = self.ledger.adjust(size as i64).await {
            warn!(%key, error = %e, "failed to credit ledger");
        }
        debug!(%key, size, ttl = draft.ttl, "stored webhook");

        Ok(CreatedWebhook {
            key,
            category: draft.category,
            ttl: draft.ttl,
            size,
            callback_registered: callback_url.is_some(),
        })
    }

    pub(crate) async fn load(&self, key: &str) -> Result<StoredRecord> {
        let storage_key = self.codec.storage_key(key);
        let raw = self
            .kv
            .get(&storage_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        StoredRecord::decode(&raw).map_err(|e| {
            KvError::Corrupt {
                key: storage_key,
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub(crate) async fn publish_created(&self, created: &CreatedWebhook) {
        self.events
            .publish(
                EventKind::Created,
                json!({
                    "key": created.key,
                    "category": created.category,
                    "size": created.size,
                    "ttl": created.ttl,
                    "callback_registered": created.callback_registered,
                }),
            )
            .await;
    }

    // ─── Record operations ──────────────────────────────────────────────────

    pub async fn create(&self, new: NewWebhook) -> Result<CreatedWebhook> {
        let category = self.resolve_category(new.category.as_deref())?;
        let bytes = encode_payload(&new.payload)?;
        let size = bytes.len() as u64;
        self.check_payload_size(size)?;

        let now = now_utc();
        let current = self.ledger.recalculate_if_stale(now.timestamp()).await?;
        self.check_quota(current, size)?;

        let ttl = self.resolve_ttl(new.ttl, payload_ttl(&new.payload));
        let created = self
            .insert(Draft {
                category,
                payload: new.payload,
                bytes,
                ttl,
                callback_url: new.callback_url,
                marker: None,
                created_at: now,
                replayed_from: None,
                original_created_at: None,
            })
            .await?;

        self.publish_created(&created).await;
        Ok(created)
    }

    pub async fn get(&self, key: &str) -> Result<Webhook> {
        let record = self.load(key).await?;
        let ttl = match self.kv.ttl(&self.codec.storage_key(key)).await? {
            KeyTtl::Missing => return Err(StoreError::NotFound(key.to_string())),
            other => other.seconds(),
        };
        let callback_url = self.kv.get(&self.codec.callback_key(key)).await?;

        Ok(Webhook {
            key: key.to_string(),
            category: record.category,
            created_at: record.created_at,
            payload: record.payload,
            size: record.size.unwrap_or_default(),
            ttl,
            callback_url,
            replayed_from: record.replayed_from,
            original_created_at: record.original_created_at,
        })
    }

    /// Change TTL and/or callback. Payloads are immutable.
    pub async fn update(&self, key: &str, update: WebhookUpdate) -> Result<UpdateChanges> {
        if let Some(ttl) = update.ttl {
            if ttl <= 0 {
                return Err(StoreError::InvalidInput(format!(
                    "ttl must be positive, got {ttl}"
                )));
            }
        }

        let record = self.load(key).await?;
        let storage_key = self.codec.storage_key(key);
        let callback_key = self.codec.callback_key(key);
        let mut changes = UpdateChanges::default();

        if let Some(ttl) = update.ttl {
            let ttl = ttl as u64;
            if !self.kv.expire(&storage_key, ttl).await? {
                return Err(StoreError::NotFound(key.to_string()));
            }
            // The callback must never outlive its record.
            self.kv.expire(&callback_key, ttl).await?;
            changes.ttl = Some(ttl);
        }

        match update.callback_url {
            Some(CallbackUpdate::Clear) => {
                if self.kv.delete(&callback_key).await? {
                    changes.callback_url = Some(None);
                }
            }
            Some(CallbackUpdate::Set(url)) => match self.kv.ttl(&storage_key).await?.seconds() {
                Some(remaining) => {
                    self.kv.set(&callback_key, &url, Some(remaining)).await?;
                    changes.callback_url = Some(Some(url));
                }
                None => debug!(%key, "record has no positive ttl, callback not set"),
            },
            None => {}
        }

        if !changes.is_empty() {
            self.events
                .publish(
                    EventKind::Updated,
                    json!({ "key": key, "category": record.category, "changes": changes }),
                )
                .await;
        }
        Ok(changes)
    }

    pub async fn delete(&self, key: &str) -> Result<DeletedWebhook> {
        let storage_key = self.codec.storage_key(key);
        let raw = self
            .kv
            .get(&storage_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let size = charged_size(&raw);
        let category = StoredRecord::decode(&raw)
            .map(|r| r.category)
            .ok()
            .or_else(|| parse_key(key).map(|p| p.category.to_string()))
            .unwrap_or_default();

        let removed = self.kv.delete(&storage_key).await?;
        self.kv.delete(&self.codec.callback_key(key)).await?;
        if !removed {
            // Expired between the read and the delete; nothing to debit.
            return Err(StoreError::NotFound(key.to_string()));
        }

        if let Err(e) = self.ledger.adjust(-(size as i64)).await {
            warn!(%key, error = %e, "failed to debit ledger");
        }
        debug!(%key, size, "deleted webhook");

        self.events
            .publish(EventKind::Deleted, json!({ "key": key, "category": category }))
            .await;

        Ok(DeletedWebhook {
            key: key.to_string(),
            category,
            size,
        })
    }
}

pub(crate) fn encode_payload(payload: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(payload)
        .map_err(|e| StoreError::InvalidInput(format!("payload is not serializable: {e}")))
}
