use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;

use super::{KeyTtl, KvError, KvStore};

/// Redis / Valkey backend.
///
/// Holds one multiplexed connection; clones of it share the socket, so
/// concurrent requests do not serialize on a pool.
#[derive(Clone)]
pub struct RedisKv {
    conn: MultiplexedConnection,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn();
        let value: Option<String> = ::redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<u64>) -> Result<(), KvError> {
        let mut conn = self.conn();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(secs) = expiry {
            cmd.arg("EX").arg(secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), KvError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let mut cmd = ::redis::cmd("MSET");
        for (key, value) in entries {
            cmd.arg(key).arg(value);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let removed: i64 = ::redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let count: i64 = ::redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, KvError> {
        let mut conn = self.conn();
        let secs: i64 = ::redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(match secs {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            s => KeyTtl::Expires(s as u64),
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError> {
        let mut conn = self.conn();
        let applied: i64 = ::redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let values: Vec<Option<String>> = ::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn();
        let keys: Vec<String> = ::redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
        Ok(keys)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let mut conn = self.conn();
        let value: i64 = ::redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, KvError> {
        let mut conn = self.conn();
        let receivers: i64 = ::redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(receivers.max(0) as usize)
    }
}
