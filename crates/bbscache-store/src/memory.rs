//! In-process [`RemoteStore`] used when Redis is disabled or unreachable.
//!
//! Mirrors the Redis data types the cache needs (strings, hashes, lists and
//! sorted sets) with per-key expiry. Expired keys are dropped lazily when
//! touched, the same observable behaviour as Redis passive expiry.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bbscache_core::{CacheError, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::namespace::Namespace;
use crate::traits::{ListSide, RemoteStore, ScoreRange, wrap_error};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    /// Kept ordered by `(score, member)`.
    ZSet(Vec<(f64, String)>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Keyspace = HashMap<String, Slot>;

struct Inner {
    data: Mutex<Keyspace>,
    pushed: Notify,
}

/// Process-local store with Redis-like semantics.
///
/// Cloning is cheap and clones share the same keyspace.
#[derive(Clone)]
pub struct MemoryStore {
    namespace: Namespace,
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            inner: Arc::new(Inner {
                data: Mutex::new(HashMap::new()),
                pushed: Notify::new(),
            }),
        }
    }

    /// Fully qualified keys currently live in the store.
    pub fn raw_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .inner
            .data
            .lock()
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remaining time to live of a key, `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let full = self.namespace.apply(key);
        let now = Instant::now();
        let data = self.inner.data.lock();
        data.get(&full)
            .filter(|slot| !slot.is_expired(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Run `f` against the live slot for `key`, dropping it first if expired.
    fn with_keyspace<R>(&self, full: &str, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let now = Instant::now();
        let mut data = self.inner.data.lock();
        if data.get(full).is_some_and(|slot| slot.is_expired(now)) {
            data.remove(full);
        }
        f(&mut data)
    }

    fn pop_right(&self, full: &str) -> Result<Option<String>> {
        self.with_keyspace(full, |data| {
            let Some(slot) = data.get_mut(full) else {
                return Ok(None);
            };
            let Value::List(list) = &mut slot.value else {
                return Err(CacheError::transport("RPOP", WRONG_TYPE));
            };
            let popped = list.pop_back();
            if slot.value.is_empty() {
                data.remove(full);
            }
            Ok(popped)
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Namespace::default())
    }
}

fn deadline_after(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Some(Instant::now() + ttl)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bound {
    value: f64,
    exclusive: bool,
}

impl Bound {
    fn parse(op: &'static str, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (exclusive, number) = match raw.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = match number {
            "-inf" => f64::NEG_INFINITY,
            "+inf" | "inf" => f64::INFINITY,
            other => other
                .parse::<f64>()
                .map_err(|_| CacheError::transport(op, "ERR min or max is not a float"))?,
        };
        Ok(Self { value, exclusive })
    }

    fn admits_above(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_below(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

fn zset_order(a: &(f64, String), b: &(f64, String)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn get_raw(&self, key: &str) -> Result<String> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| match data.get(&full).map(|s| &s.value) {
            Some(Value::Str(s)) => Ok(s.clone()),
            Some(_) => Err(CacheError::transport("GET", WRONG_TYPE)),
            None => Err(CacheError::not_found(key)),
        })
        .map_err(|e| wrap_error("GET", key, e))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let full = self.namespace.apply(key);
        let slot = Slot {
            value: Value::Str(value.to_string()),
            expires_at: deadline_after(ttl),
        };
        self.inner.data.lock().insert(full, slot);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        self.inner.data.lock().remove(&full);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full = self.namespace.apply(key);
        Ok(self.with_keyspace(&full, |data| data.contains_key(&full)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let full = self.namespace.apply(key);
        Ok(self.with_keyspace(&full, |data| match data.get_mut(&full) {
            Some(slot) => {
                slot.expires_at = deadline_after(ttl);
                true
            }
            None => false,
        }))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let slot = data
                .entry(full.clone())
                .or_insert_with(|| Slot::new(Value::Str("0".to_string())));
            let Value::Str(current) = &mut slot.value else {
                return Err(CacheError::transport("INCR", WRONG_TYPE));
            };
            let next = current
                .parse::<i64>()
                .ok()
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| {
                    CacheError::transport("INCR", "ERR value is not an integer or out of range")
                })?;
            *current = next.to_string();
            Ok(next)
        })
        .map_err(|e| wrap_error("INCR", key, e))
    }

    async fn hget_raw(&self, key: &str, field: &str) -> Result<String> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| match data.get(&full).map(|s| &s.value) {
            Some(Value::Hash(h)) => h.get(field).cloned().ok_or_else(|| CacheError::not_found(key)),
            Some(_) => Err(CacheError::transport("HGET", WRONG_TYPE)),
            None => Err(CacheError::not_found(key)),
        })
        .map_err(|e| wrap_error("HGET", key, e))
    }

    async fn hset_raw(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hmset_raw(key, &[(field.to_string(), value.to_string())])
            .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| match data.get(&full).map(|s| &s.value) {
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(CacheError::transport("HGETALL", WRONG_TYPE)),
            None => Ok(HashMap::new()),
        })
        .map_err(|e| wrap_error("HGETALL", key, e))
    }

    async fn hmget_slots(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| match data.get(&full).map(|s| &s.value) {
            Some(Value::Hash(h)) => Ok(fields.iter().map(|f| h.get(*f).cloned()).collect()),
            Some(_) => Err(CacheError::transport("HMGET", WRONG_TYPE)),
            None => Ok(vec![None; fields.len()]),
        })
        .map_err(|e| wrap_error("HMGET", key, e))
    }

    async fn hmset_raw(&self, key: &str, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let slot = data
                .entry(full.clone())
                .or_insert_with(|| Slot::new(Value::Hash(HashMap::new())));
            let Value::Hash(hash) = &mut slot.value else {
                return Err(CacheError::transport("HSET", WRONG_TYPE));
            };
            hash.extend(entries.iter().cloned());
            Ok(())
        })
        .map_err(|e| wrap_error("HSET", key, e))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let Some(slot) = data.get_mut(&full) else {
                return Ok(());
            };
            let Value::Hash(hash) = &mut slot.value else {
                return Err(CacheError::transport("HDEL", WRONG_TYPE));
            };
            hash.remove(field);
            if slot.value.is_empty() {
                data.remove(&full);
            }
            Ok(())
        })
        .map_err(|e| wrap_error("HDEL", key, e))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.hgetall(key).await?.into_keys().collect();
        keys.sort();
        Ok(keys)
    }

    async fn push(&self, key: &str, side: ListSide, values: &[String]) -> Result<()> {
        let full = self.namespace.apply(key);
        let op = match side {
            ListSide::Left => "LPUSH",
            ListSide::Right => "RPUSH",
        };
        self.with_keyspace(&full, |data| {
            let slot = data
                .entry(full.clone())
                .or_insert_with(|| Slot::new(Value::List(VecDeque::new())));
            let Value::List(list) = &mut slot.value else {
                return Err(CacheError::transport(op, WRONG_TYPE));
            };
            for value in values {
                match side {
                    ListSide::Left => list.push_front(value.clone()),
                    ListSide::Right => list.push_back(value.clone()),
                }
            }
            Ok(())
        })
        .map_err(|e| wrap_error(op, key, e))?;
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let full = self.namespace.apply(key);
        self.pop_right(&full).map_err(|e| wrap_error("RPOP", key, e))
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let full = self.namespace.apply(key);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            // register before checking so a push in between is not missed
            notified.as_mut().enable();

            if let Some(value) = self.pop_right(&full).map_err(|e| wrap_error("BRPOP", key, e))? {
                return Ok(Some(value));
            }

            if timeout.is_zero() || tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        if score.is_nan() {
            return Err(wrap_error(
                "ZADD",
                key,
                CacheError::transport("ZADD", "ERR value is not a valid float"),
            ));
        }
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let slot = data
                .entry(full.clone())
                .or_insert_with(|| Slot::new(Value::ZSet(Vec::new())));
            let Value::ZSet(set) = &mut slot.value else {
                return Err(CacheError::transport("ZADD", WRONG_TYPE));
            };
            set.retain(|(_, m)| m != member);
            let entry = (score, member.to_string());
            let at = set
                .binary_search_by(|other| zset_order(other, &entry))
                .unwrap_or_else(|pos| pos);
            set.insert(at, entry);
            Ok(())
        })
        .map_err(|e| wrap_error("ZADD", key, e))
    }

    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> Result<Vec<String>> {
        let min = Bound::parse("ZRANGEBYSCORE", &range.min).map_err(|e| wrap_error("ZRANGEBYSCORE", key, e))?;
        let max = Bound::parse("ZRANGEBYSCORE", &range.max).map_err(|e| wrap_error("ZRANGEBYSCORE", key, e))?;
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let set = match data.get(&full).map(|s| &s.value) {
                Some(Value::ZSet(set)) => set,
                Some(_) => return Err(CacheError::transport("ZRANGEBYSCORE", WRONG_TYPE)),
                None => return Ok(Vec::new()),
            };
            let matching = set
                .iter()
                .filter(|(score, _)| min.admits_above(*score) && max.admits_below(*score))
                .map(|(_, member)| member.clone());
            Ok(match range.limit {
                Some((offset, _)) if offset < 0 => Vec::new(),
                Some((offset, count)) => {
                    let take = usize::try_from(count).unwrap_or(usize::MAX);
                    matching.skip(offset as usize).take(take).collect()
                }
                None => matching.collect(),
            })
        })
        .map_err(|e| wrap_error("ZRANGEBYSCORE", key, e))
    }

    async fn zrem_range_by_score(&self, key: &str, min: &str, max: &str) -> Result<u64> {
        let min = Bound::parse("ZREMRANGEBYSCORE", min).map_err(|e| wrap_error("ZREMRANGEBYSCORE", key, e))?;
        let max = Bound::parse("ZREMRANGEBYSCORE", max).map_err(|e| wrap_error("ZREMRANGEBYSCORE", key, e))?;
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let Some(slot) = data.get_mut(&full) else {
                return Ok(0);
            };
            let Value::ZSet(set) = &mut slot.value else {
                return Err(CacheError::transport("ZREMRANGEBYSCORE", WRONG_TYPE));
            };
            let before = set.len();
            set.retain(|(score, _)| !(min.admits_above(*score) && max.admits_below(*score)));
            let removed = (before - set.len()) as u64;
            if slot.value.is_empty() {
                data.remove(&full);
            }
            Ok(removed)
        })
        .map_err(|e| wrap_error("ZREMRANGEBYSCORE", key, e))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let full = self.namespace.apply(key);
        self.with_keyspace(&full, |data| {
            let Some(slot) = data.get_mut(&full) else {
                return Ok(());
            };
            let Value::ZSet(set) = &mut slot.value else {
                return Err(CacheError::transport("ZREM", WRONG_TYPE));
            };
            set.retain(|(_, m)| m != member);
            if slot.value.is_empty() {
                data.remove(&full);
            }
            Ok(())
        })
        .map_err(|e| wrap_error("ZREM", key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RemoteStoreExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: i64,
        name: String,
    }

    fn store() -> MemoryStore {
        MemoryStore::default()
    }

    #[tokio::test]
    async fn typed_set_then_get() {
        let store = store();
        let profile = Profile {
            id: 42,
            name: "alice".into(),
        };
        store.set("user:42", &profile, Duration::ZERO).await.unwrap();

        let loaded: Profile = store.get("user:42").await.unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(store.raw_keys(), vec!["fbi:user:42".to_string()]);
    }

    #[tokio::test]
    async fn raw_and_serialized_strings_differ() {
        let store = store();
        store.set("s", "hello", Duration::ZERO).await.unwrap();
        assert_eq!(store.get_raw("s").await.unwrap(), "\"hello\"");

        store.set_raw("s", "hello", Duration::ZERO).await.unwrap();
        assert_eq!(store.get_raw("s").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let err = store().get_raw("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn keys_expire_after_ttl() {
        let store = store();
        store
            .set_raw("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(store.exists("short").await.unwrap());
        assert!(store.ttl("short").is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("short").await.unwrap());
        assert!(store.get_raw("short").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn expire_reports_presence() {
        let store = store();
        assert!(!store.expire("absent", Duration::from_secs(1)).await.unwrap());

        store.set_raw("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.ttl("k").is_none());
        assert!(store.expire("k", Duration::from_secs(60)).await.unwrap());
        assert!(store.ttl("k").is_some());
        assert!(store.expire("k", Duration::ZERO).await.unwrap());
        assert!(store.ttl("k").is_none());
    }

    #[tokio::test]
    async fn delete_absent_key_is_ok() {
        store().delete("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn hmget_drops_absent_fields() {
        let store = store();
        store.hset_raw("h", "a", "1").await.unwrap();
        store.hset_raw("h", "c", "3").await.unwrap();

        let values = store.hmget("h", &["a", "b", "c"]).await.unwrap();
        assert_eq!(values, vec!["1".to_string(), "3".to_string()]);

        let slots = store.hmget_slots("h", &["a", "b"]).await.unwrap();
        assert_eq!(slots, vec![Some("1".to_string()), None]);
    }

    #[tokio::test]
    async fn hash_typed_fields_and_removal() {
        let store = store();
        let one = 1_i64;
        let two = 2_i64;
        store.hmset("scores", &[("a", &one), ("b", &two)]).await.unwrap();
        assert_eq!(store.hget::<i64>("scores", "b").await.unwrap(), 2);
        assert_eq!(store.hkeys("scores").await.unwrap(), vec!["a", "b"]);

        store.hdel("scores", "a").await.unwrap();
        store.hdel("scores", "b").await.unwrap();
        assert!(!store.exists("scores").await.unwrap());
        assert!(store.hgetall("scores").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hset_and_expire_sets_ttl() {
        let store = store();
        store
            .hset_and_expire("session", "uid", "7", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.hget_raw("session", "uid").await.unwrap(), "7");
        assert!(store.ttl("session").is_some());
    }

    #[tokio::test]
    async fn empty_pushes_are_noops() {
        let store = store();
        store.lpush("list", "").await.unwrap();
        store.rpush("list", "   ").await.unwrap();
        store.lpush_n("list", &[]).await.unwrap();
        store.lpush_n("list", &["".to_string()]).await.unwrap();
        assert!(!store.exists("list").await.unwrap());
    }

    #[tokio::test]
    async fn list_order() {
        let store = store();
        store.rpush("q", "a").await.unwrap();
        store.rpush("q", "b").await.unwrap();
        store.lpush("q", "z").await.unwrap();
        // list is now z, a, b
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("z"));
        assert_eq!(store.rpop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn brpop_times_out_with_none() {
        let popped = store()
            .brpop("idle", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn brpop_zero_timeout_does_not_block() {
        let store = store();
        let popped = tokio::time::timeout(Duration::from_secs(1), store.brpop("idle", Duration::ZERO))
            .await
            .expect("zero timeout must not block")
            .unwrap();
        assert_eq!(popped, None);

        store.rpush("idle", "job").await.unwrap();
        assert_eq!(store.brpop("idle", Duration::ZERO).await.unwrap().as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn sub_millisecond_ttl_still_expires() {
        let store = store();
        store.set_raw("blip", "v", Duration::from_micros(500)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!store.exists("blip").await.unwrap());
    }

    #[tokio::test]
    async fn brpop_wakes_on_push() {
        let store = store();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.brpop("jobs", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.lpush("jobs", "job-1").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn sorted_set_ranges() {
        let store = store();
        store.zadd("z", 3.0, "c").await.unwrap();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();
        store.zadd("z", 5.0, "a").await.unwrap();

        assert_eq!(store.zrange_by_score("z", &ScoreRange::all()).await.unwrap(), vec!["b", "c", "a"]);
        assert_eq!(
            store.zrange_by_score("z", &ScoreRange::new("(2", "+inf")).await.unwrap(),
            vec!["c", "a"]
        );
        assert_eq!(
            store.zrange_by_score("z", &ScoreRange::all().page(1, 1)).await.unwrap(),
            vec!["c"]
        );

        assert_eq!(store.zrem_range_by_score("z", "-inf", "3").await.unwrap(), 2);
        store.zrem("z", "a").await.unwrap();
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_score_bound_is_an_error() {
        let err = store()
            .zrange_by_score("z", &ScoreRange::new("low", "high"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn concurrent_incr_is_atomic() {
        let store = store();
        store.set_raw("ctr", "0", Duration::ZERO).await.unwrap();

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.incr("ctr").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get_raw("ctr").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let store = store();
        store.rpush("l", "x").await.unwrap();
        let err = store.get_raw("l").await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }
}
