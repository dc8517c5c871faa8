use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

/// Current time truncated to whole seconds.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Record value as persisted in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replayed_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_created_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Bytes to debit for a stored value: its `size` field, or the raw length
/// when that field is missing or the value does not decode.
pub fn charged_size(raw: &str) -> u64 {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("size").and_then(Value::as_u64))
        .unwrap_or(raw.len() as u64)
}

/// A new payload to store.
#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub payload: Value,
    pub category: Option<String>,
    pub ttl: Option<i64>,
    pub callback_url: Option<String>,
}

impl NewWebhook {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            category: None,
            ttl: None,
            callback_url: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Requested TTL; non-positive values fall back to the payload or default.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// Positive `ttl` field of an object payload, if any.
pub fn payload_ttl(payload: &Value) -> Option<u64> {
    payload
        .get("ttl")
        .and_then(Value::as_i64)
        .filter(|t| *t > 0)
        .map(|t| t as u64)
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedWebhook {
    pub key: String,
    pub category: String,
    pub ttl: u64,
    pub size: u64,
    pub callback_registered: bool,
}

/// A record as returned by a point lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Webhook {
    pub key: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    pub size: u64,
    /// Remaining seconds; `None` when the backend reports no expiry.
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackUpdate {
    Set(String),
    Clear,
}

/// Mutable metadata of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookUpdate {
    pub ttl: Option<i64>,
    pub callback_url: Option<CallbackUpdate>,
}

impl WebhookUpdate {
    /// Read a PATCH body. `callback_url` of `null`, `false` or `""` clears it.
    pub fn from_json(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| StoreError::InvalidInput("update body must be an object".into()))?;

        let ttl = match obj.get("ttl") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_i64()
                    .ok_or_else(|| StoreError::InvalidInput("ttl must be an integer".into()))?,
            ),
        };

        let callback_url = match obj.get("callback_url") {
            None => None,
            Some(Value::Null) | Some(Value::Bool(false)) => Some(CallbackUpdate::Clear),
            Some(Value::String(s)) if s.is_empty() => Some(CallbackUpdate::Clear),
            Some(Value::String(s)) => Some(CallbackUpdate::Set(s.clone())),
            Some(_) => {
                return Err(StoreError::InvalidInput(
                    "callback_url must be a string, null or false".into(),
                ))
            }
        };

        Ok(Self { ttl, callback_url })
    }
}

/// Fields actually changed by an update. `callback_url: Some(None)` means
/// the callback was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<Option<String>>,
}

impl UpdateChanges {
    pub fn is_empty(&self) -> bool {
        self.ttl.is_none() && self.callback_url.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedWebhook {
    pub key: String,
    pub category: String,
    pub size: u64,
}

/// Listing and search entry.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookSummary {
    pub key: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Option<u64>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub key: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_webhooks: u64,
    pub total_size_bytes: u64,
    pub storage_limit_bytes: u64,
    pub categories: BTreeMap<String, u64>,
    pub oldest_webhook: Option<RecordRef>,
    pub newest_webhook: Option<RecordRef>,
}

/// Why one item of a batch or import did not go through.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub error_code: &'static str,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(index: usize, err: &StoreError) -> Self {
        Self {
            index,
            error_code: err.error_code(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchCreateReport {
    pub success: Vec<CreatedWebhook>,
    pub failed: Vec<ItemFailure>,
}

impl BatchCreateReport {
    pub fn is_partial(&self) -> bool {
        !self.success.is_empty() && !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchDeleteReport {
    pub deleted: Vec<String>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub category: Option<String>,
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayedWebhook {
    pub original_key: String,
    pub new_key: String,
    pub category: String,
    pub ttl: u64,
}

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedWebhook {
    pub key: String,
    pub ttl: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub category: Option<String>,
    pub total_exported: usize,
    pub webhooks: Vec<ExportedWebhook>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedWebhook {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_key: Option<String>,
    pub key: String,
    pub category: String,
    pub ttl: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<ImportedWebhook>,
    pub failed: Vec<ItemFailure>,
}
