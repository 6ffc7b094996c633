//! Redis-backed [`RemoteStore`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bbscache_core::{CacheError, Result};
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, RedisResult};

use crate::namespace::Namespace;
use crate::traits::{ListSide, RemoteStore, ScoreRange, wrap_error};

/// Deadline applied to each call unless overridden with [`RedisStore::with_deadline`].
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Milliseconds for PX / PEXPIRE. A non-zero TTL never rounds down to 0,
/// which Redis would reject (SET) or treat as immediate deletion (PEXPIRE).
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Remote store talking to Redis through a `deadpool_redis` pool.
///
/// Every call (connection checkout included) runs under a deadline. An
/// elapsed deadline surfaces as [`CacheError::Timeout`], never as a miss.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    namespace: Namespace,
    deadline: Duration,
}

impl RedisStore {
    pub fn new(pool: Pool, namespace: Namespace) -> Self {
        Self {
            pool,
            namespace,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// A clone sharing the same pool but bound to a different deadline.
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            pool: self.pool.clone(),
            namespace: self.namespace.clone(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.run_within(self.deadline, op, key, f).await
    }

    async fn run_within<T, F, Fut>(
        &self,
        deadline: Duration,
        op: &'static str,
        key: &str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let call = async {
            let conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::transport(op, format!("connection pool: {e}")))?;
            f(conn)
                .await
                .map_err(|e| CacheError::transport(op, e.to_string()))
        };

        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result.map_err(|e| wrap_error(op, key, e)),
            Err(_) => Err(wrap_error(op, key, CacheError::timeout(op, deadline))),
        }
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> bool {
        let pong: Result<String> = self
            .run("PING", "", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await;
        pong.is_ok()
    }

    async fn get_raw(&self, key: &str) -> Result<String> {
        let full = self.namespace.apply(key);
        let value: Option<String> = self
            .run("GET", key, |mut conn| async move { conn.get(&full).await })
            .await?;
        value.ok_or_else(|| wrap_error("GET", key, CacheError::not_found(key)))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let full = self.namespace.apply(key);
        let value = value.to_string();
        self.run("SET", key, |mut conn| async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&full).arg(value);
            if !ttl.is_zero() {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            cmd.query_async(&mut conn).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        self.run("DEL", key, |mut conn| async move { conn.del(&full).await })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full = self.namespace.apply(key);
        self.run("EXISTS", key, |mut conn| async move { conn.exists(&full).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let full = self.namespace.apply(key);
        self.run("PEXPIRE", key, |mut conn| async move {
            if ttl.is_zero() {
                // PERSIST reports 0 when there was no TTL to clear
                let exists: bool = conn.exists(&full).await?;
                if exists {
                    let _: () = redis::cmd("PERSIST").arg(&full).query_async(&mut conn).await?;
                }
                return Ok(exists);
            }
            redis::cmd("PEXPIRE")
                .arg(&full)
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let full = self.namespace.apply(key);
        self.run("INCR", key, |mut conn| async move { conn.incr(&full, 1_i64).await })
            .await
    }

    async fn hget_raw(&self, key: &str, field: &str) -> Result<String> {
        let full = self.namespace.apply(key);
        let field = field.to_string();
        let value: Option<String> = self
            .run("HGET", key, |mut conn| async move { conn.hget(&full, &field).await })
            .await?;
        value.ok_or_else(|| wrap_error("HGET", key, CacheError::not_found(key)))
    }

    async fn hset_raw(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        let field = field.to_string();
        let value = value.to_string();
        self.run("HSET", key, |mut conn| async move {
            conn.hset(&full, &field, &value).await
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let full = self.namespace.apply(key);
        self.run("HGETALL", key, |mut conn| async move { conn.hgetall(&full).await })
            .await
    }

    async fn hmget_slots(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let full = self.namespace.apply(key);
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.run("HMGET", key, |mut conn| async move {
            redis::cmd("HMGET")
                .arg(&full)
                .arg(&fields)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn hmset_raw(&self, key: &str, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let full = self.namespace.apply(key);
        let entries = entries.to_vec();
        self.run("HSET", key, |mut conn| async move {
            conn.hset_multiple(&full, entries.as_slice()).await
        })
        .await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        let field = field.to_string();
        self.run("HDEL", key, |mut conn| async move { conn.hdel(&full, &field).await })
            .await
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let full = self.namespace.apply(key);
        self.run("HKEYS", key, |mut conn| async move { conn.hkeys(&full).await })
            .await
    }

    async fn push(&self, key: &str, side: ListSide, values: &[String]) -> Result<()> {
        let full = self.namespace.apply(key);
        let values = values.to_vec();
        let op = match side {
            ListSide::Left => "LPUSH",
            ListSide::Right => "RPUSH",
        };
        self.run(op, key, |mut conn| async move {
            redis::cmd(op)
                .arg(&full)
                .arg(&values)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let full = self.namespace.apply(key);
        self.run("RPOP", key, |mut conn| async move {
            redis::cmd("RPOP").arg(&full).query_async(&mut conn).await
        })
        .await
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        // BRPOP 0 would block forever on the server
        if timeout.is_zero() {
            return self.rpop(key).await;
        }
        let full = self.namespace.apply(key);
        // the server-side wait must not be cut short by the call deadline
        let deadline = timeout + self.deadline;
        let reply: Option<(String, String)> = self
            .run_within(deadline, "BRPOP", key, |mut conn| async move {
                redis::cmd("BRPOP")
                    .arg(&full)
                    .arg(timeout.as_secs_f64())
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        let member = member.to_string();
        self.run("ZADD", key, |mut conn| async move {
            redis::cmd("ZADD")
                .arg(&full)
                .arg(score)
                .arg(&member)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> Result<Vec<String>> {
        let full = self.namespace.apply(key);
        let range = range.clone();
        self.run("ZRANGEBYSCORE", key, |mut conn| async move {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(&full).arg(&range.min).arg(&range.max);
            if let Some((offset, count)) = range.limit {
                cmd.arg("LIMIT").arg(offset).arg(count);
            }
            cmd.query_async(&mut conn).await
        })
        .await
    }

    async fn zrem_range_by_score(&self, key: &str, min: &str, max: &str) -> Result<u64> {
        let full = self.namespace.apply(key);
        let (min, max) = (min.to_string(), max.to_string());
        self.run("ZREMRANGEBYSCORE", key, |mut conn| async move {
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(&full)
                .arg(&min)
                .arg(&max)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        let member = member.to_string();
        self.run("ZREM", key, |mut conn| async move { conn.zrem(&full, &member).await })
            .await
    }
}
