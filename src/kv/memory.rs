use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use super::{glob_match, KeyTtl, KvError, KvStore};

const CHANNEL_CAPACITY: usize = 256;

/// A message delivered through [`MemoryKv::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process backend for single-node deployments and tests.
///
/// Expired keys are purged lazily on access. Deadlines use tokio's clock so
/// paused-time tests can advance past them.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    events: broadcast::Sender<PublishedMessage>,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Listen to everything published on any channel.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.events.subscribe()
    }

    fn purge(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, Instant::now());
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<u64>) -> Result<(), KvError> {
        let expires_at = expiry.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_many(&self, items: &[(String, String)]) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, Instant::now());
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, Instant::now());
        Ok(entries.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, now);
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                // Rounded to the nearest second, like Redis TTL.
                let millis = at.saturating_duration_since(now).as_millis() as u64;
                KeyTtl::Expires((millis + 500) / 1000)
            }
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .map(|k| {
                entries
                    .get(k)
                    .filter(|e| e.is_live(now))
                    .map(|e| e.value.clone())
            })
            .collect())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.is_live(now));
        Ok(entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Self::purge(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| KvError::Command(format!("value at {key} is not an integer")))?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| KvError::Command(format!("increment at {key} would overflow")))?;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, KvError> {
        let msg = PublishedMessage {
            channel: channel.to_string(),
            payload: message.to_string(),
        };
        // No subscribers is not an error; nobody was reached.
        Ok(self.events.send(msg).unwrap_or(0))
    }
}
