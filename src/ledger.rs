//! Running total of stored payload bytes.
//!
//! Adjusted on every create and delete, and recomputed from a full scan when
//! the last recomputation is older than the configured interval. Native
//! expirations never reach the ledger, so between scans the total drifts up.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::keys::KeyCodec;
use crate::kv::{KvError, KvStore};
use crate::types::charged_size;

#[derive(Clone)]
pub struct SizeLedger {
    kv: Arc<dyn KvStore>,
    codec: KeyCodec,
    interval_secs: u64,
}

impl SizeLedger {
    pub fn new(kv: Arc<dyn KvStore>, codec: KeyCodec, interval_secs: u64) -> Self {
        Self {
            kv,
            codec,
            interval_secs,
        }
    }

    /// Last known total, 0 when unset or unreadable.
    pub async fn get(&self) -> Result<u64, KvError> {
        let raw = self.kv.get(&self.codec.ledger_total_key()).await?;
        Ok(raw
            .and_then(|v| v.parse::<i64>().ok())
            .map_or(0, |v| v.max(0) as u64))
    }

    /// Add `delta` bytes (negative to debit). The total never goes below 0.
    /// An unreadable total is replaced by `delta`; the next rescan fixes it.
    pub async fn adjust(&self, delta: i64) -> Result<u64, KvError> {
        let key = self.codec.ledger_total_key();
        let total = match self.kv.incr_by(&key, delta).await {
            Ok(total) => total,
            Err(e) => {
                let raw = self.kv.get(&key).await?;
                if raw.is_some_and(|v| v.parse::<i64>().is_ok()) {
                    return Err(e);
                }
                warn!(error = %e, "ledger total unreadable, resetting");
                let reset = delta.max(0);
                self.kv.set(&key, &reset.to_string(), None).await?;
                return Ok(reset as u64);
            }
        };
        if total < 0 {
            debug!(total, delta, "ledger went negative, clamping to 0");
            self.kv.set(&key, "0", None).await?;
            return Ok(0);
        }
        Ok(total as u64)
    }

    /// Cached total, or a fresh scan if the last one is older than the interval.
    pub async fn recalculate_if_stale(&self, now: i64) -> Result<u64, KvError> {
        let last = self
            .kv
            .get(&self.codec.ledger_marker_key())
            .await?
            .and_then(|v| v.parse::<i64>().ok());

        if let Some(last) = last {
            if now.saturating_sub(last) <= self.interval_secs as i64 {
                return self.get().await;
            }
        }
        self.recalculate(now).await
    }

    /// Full scan. Sums each record's `size` field, or its raw length.
    pub async fn recalculate(&self, now: i64) -> Result<u64, KvError> {
        let scanned = self.kv.keys(&self.codec.scan_pattern(None)).await?;
        let keys: Vec<String> = scanned
            .into_iter()
            .filter(|k| !self.codec.is_bookkeeping(k))
            .collect();
        let values = self.kv.get_many(&keys).await?;
        let total: u64 = values.iter().flatten().map(|raw| charged_size(raw)).sum();

        self.kv
            .set_many(&[
                (self.codec.ledger_total_key(), total.to_string()),
                (self.codec.ledger_marker_key(), now.to_string()),
            ])
            .await?;
        info!(total, records = keys.len(), "recalculated storage ledger");
        Ok(total)
    }
}
