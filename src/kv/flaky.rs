use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{KeyTtl, KvError, KvStore, MemoryKv};

/// [`MemoryKv`] wrapper whose operations can be told to fail, by name.
pub(crate) struct FlakyKv {
    pub inner: MemoryKv,
    // Operation name -> calls still allowed before it starts failing.
    budget: Mutex<HashMap<&'static str, usize>>,
}

impl FlakyKv {
    pub fn new() -> Self {
        Self {
            inner: MemoryKv::new(),
            budget: Mutex::new(HashMap::new()),
        }
    }

    /// Fail every call to `op` from now on.
    pub fn fail(&self, op: &'static str) {
        self.fail_after(op, 0);
    }

    /// Let `calls` more calls to `op` through, then fail the rest.
    pub fn fail_after(&self, op: &'static str, calls: usize) {
        self.budget.lock().unwrap().insert(op, calls);
    }

    fn check(&self, op: &'static str) -> Result<(), KvError> {
        let mut budget = self.budget.lock().unwrap();
        match budget.get_mut(op) {
            Some(0) => Err(KvError::Command(format!("{op}: connection reset"))),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<u64>) -> Result<(), KvError> {
        self.check("set")?;
        self.inner.set(key, value, expiry).await
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), KvError> {
        self.check("set_many")?;
        self.inner.set_many(entries).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.check("delete")?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.check("exists")?;
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, KvError> {
        self.check("ttl")?;
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError> {
        self.check("expire")?;
        self.inner.expire(key, seconds).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        self.check("get_many")?;
        self.inner.get_many(keys).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.check("keys")?;
        self.inner.keys(pattern).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        self.check("incr_by")?;
        self.inner.incr_by(key, delta).await
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, KvError> {
        self.check("publish")?;
        self.inner.publish(channel, message).await
    }
}
