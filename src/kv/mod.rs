//! Key-value backend contract.
//!
//! The store never talks to a concrete database directly. Everything it
//! needs (records, callback entries, the size ledger, event fan-out) goes
//! through [`KvStore`], whose operations are each atomic on a single key.

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub(crate) mod flaky;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryKv, PublishedMessage};
#[cfg(feature = "redis")]
pub use self::redis::RedisKv;

/// Errors returned by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend rejected a command (wrong type, bad argument, ...).
    #[error("command failed: {0}")]
    Command(String),

    /// A stored value could not be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Remaining lifetime of a key, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(u64),
}

impl KeyTtl {
    /// Seconds left, if the key has a positive expiry.
    pub fn seconds(self) -> Option<u64> {
        match self {
            KeyTtl::Expires(secs) if secs > 0 => Some(secs),
            _ => None,
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set a value. `expiry` in seconds; `None` stores it without expiry.
    async fn set(&self, key: &str, value: &str, expiry: Option<u64>) -> Result<(), KvError>;

    /// Set several persistent values in one call.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), KvError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, KvError>;

    /// Re-arm the expiry of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError>;

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError>;

    /// Enumerate keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Atomically add `delta` to an integer value, creating it at 0.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError>;

    /// Publish a message, returning the number of receivers reached.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, KvError>;
}

/// Glob match supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    let (mut pi, mut ci) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ci));
            pi += 1;
        } else if let Some((sp, sc)) = star {
            pi = sp + 1;
            ci = sc + 1;
            star = Some((sp, sc + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
