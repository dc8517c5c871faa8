//! Key naming.
//!
//! External keys look like `<category>:<unix_ts>:[<disambiguator>:]<hash>`.
//! In the backend they live under the record prefix; the callback entry for
//! the same record lives under the callback prefix. This module is the only
//! place that adds or strips those prefixes.

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

const HASH_LEN: usize = 16;
const LEDGER_NAMESPACE: &str = "_ledger:";

/// Category and creation second embedded in an external key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    pub category: &'a str,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct KeyCodec {
    record_prefix: String,
    callback_prefix: String,
}

impl KeyCodec {
    pub fn new(record_prefix: impl Into<String>, callback_prefix: impl Into<String>) -> Self {
        Self {
            record_prefix: record_prefix.into(),
            callback_prefix: callback_prefix.into(),
        }
    }

    /// Build an external key for a payload created at `now`.
    pub fn generate_key(
        &self,
        category: &str,
        payload: &[u8],
        disambiguator: Option<&str>,
        now: i64,
    ) -> String {
        let hash = content_hash(payload);
        match disambiguator {
            Some(d) => format!("{category}:{now}:{d}:{hash}"),
            None => format!("{category}:{now}:{hash}"),
        }
    }

    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.record_prefix)
    }

    pub fn callback_key(&self, key: &str) -> String {
        format!("{}{key}", self.callback_prefix)
    }

    /// External form of a backend record key, or `None` for foreign keys.
    pub fn strip_prefix<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.record_prefix.as_str())
    }

    /// Scan pattern for one category, or every record when `None`.
    pub fn scan_pattern(&self, category: Option<&str>) -> String {
        match category {
            Some(c) => format!("{}{c}:*", self.record_prefix),
            None => format!("{}*", self.record_prefix),
        }
    }

    /// Ledger bookkeeping keys share the record namespace and must be
    /// skipped by scans.
    pub fn is_bookkeeping(&self, storage_key: &str) -> bool {
        self.strip_prefix(storage_key)
            .is_some_and(|rest| rest.starts_with(LEDGER_NAMESPACE))
    }

    pub fn ledger_total_key(&self) -> String {
        format!("{}{LEDGER_NAMESPACE}total_size", self.record_prefix)
    }

    pub fn ledger_marker_key(&self) -> String {
        format!("{}{LEDGER_NAMESPACE}recalculated_at", self.record_prefix)
    }

    /// Record keys out of a raw scan: bookkeeping dropped, prefix stripped.
    pub fn record_keys(&self, scanned: Vec<String>) -> Vec<String> {
        scanned
            .into_iter()
            .filter(|k| !self.is_bookkeeping(k))
            .filter_map(|k| self.strip_prefix(&k).map(str::to_string))
            .collect()
    }
}

/// Split an external key into category and timestamp. Never panics.
pub fn parse_key(key: &str) -> Option<ParsedKey<'_>> {
    let mut parts = key.splitn(3, ':');
    let category = parts.next().filter(|c| !c.is_empty())?;
    let timestamp = parts.next()?.parse().ok()?;
    Some(ParsedKey {
        category,
        timestamp,
    })
}

/// Reject categories that would break key parsing or scan patterns.
pub fn validate_category(category: &str) -> Result<()> {
    if category.is_empty() {
        return Err(StoreError::InvalidInput("category must not be empty".into()));
    }
    if category.starts_with('_') {
        return Err(StoreError::InvalidInput(format!(
            "category {category:?} is reserved"
        )));
    }
    if category.contains([':', '*', '?', '[', ']']) {
        return Err(StoreError::InvalidInput(format!(
            "category {category:?} contains reserved characters"
        )));
    }
    Ok(())
}

fn content_hash(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}
