//! Ephemeral storage for webhook payloads.
//!
//! Payloads are kept as JSON records with a native expiry in a key-value
//! backend ([`kv::KvStore`]), grouped by category, and tracked against a
//! soft byte quota. Around the single-record operations sit listing,
//! search, stats, batch writes, replay and export/import, plus lifecycle
//! events published on a channel. [`http_server`] exposes it all over HTTP.

mod batch;
mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod http_server;
pub mod keys;
pub mod kv;
pub mod ledger;
mod replay;
pub mod store;
mod transfer;
pub mod types;

pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use events::{EventKind, WebhookEvent};
pub use kv::{KeyTtl, KvError, KvStore, MemoryKv};
pub use store::WebhookStore;
pub use types::{
    BatchCreateReport, BatchDeleteReport, CallbackUpdate, CreatedWebhook, DeletedWebhook,
    ExportDocument, ImportReport, NewWebhook, ReplayOptions, ReplayedWebhook, StoreStats,
    UpdateChanges, Webhook, WebhookSummary, WebhookUpdate,
};
