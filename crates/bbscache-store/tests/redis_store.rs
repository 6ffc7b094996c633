//! Integration tests for the Redis-backed remote store.
//!
//! Tests use testcontainers to spin up a real Redis instance and are ignored
//! by default because they need Docker: `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use bbscache_store::{
    CacheAside, RedisStoreConfig, RemoteStore, RemoteStoreExt, ScoreRange, create_remote_store,
    is_remote_available,
};
use serde::{Deserialize, Serialize};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

/// Each test gets its own prefix so they can share the container.
async fn store(prefix: &str) -> Arc<dyn RemoteStore> {
    let config = RedisStoreConfig {
        enabled: true,
        url: get_redis_url().await,
        key_prefix: format!("{prefix}:"),
        ..Default::default()
    };
    let store = create_remote_store(&config).await;
    assert!(is_remote_available(store.as_ref()), "expected the Redis backend");
    store
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    nickname: String,
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_typed_round_trip() {
    let store = store("roundtrip").await;
    let user = User {
        id: 42,
        nickname: "neo".into(),
    };

    store.set("user:42", &user, Duration::from_secs(60)).await.unwrap();
    let loaded: User = store.get("user:42").await.unwrap();
    assert_eq!(loaded, user);

    store.delete("user:42").await.unwrap();
    assert!(store.get_raw("user:42").await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_keys_carry_namespace() {
    let url = get_redis_url().await;
    let store = store("ns").await;
    store.set_raw("k", "v", Duration::ZERO).await.unwrap();

    let client = redis::Client::open(url).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let raw: Option<String> = redis::cmd("GET").arg("ns:k").query_async(&mut conn).await.unwrap();
    assert_eq!(raw.as_deref(), Some("v"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_ttl_expiry() {
    let store = store("ttl").await;
    store
        .set_raw("short", "v", Duration::from_millis(100))
        .await
        .unwrap();
    assert!(store.exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!store.exists("short").await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_hash_operations() {
    let store = store("hash").await;
    store.hset_raw("h", "a", "1").await.unwrap();
    store
        .hmset_raw("h", &[("c".into(), "3".into())])
        .await
        .unwrap();

    assert_eq!(store.hmget("h", &["a", "b", "c"]).await.unwrap(), vec!["1", "3"]);
    assert_eq!(store.hgetall("h").await.unwrap().len(), 2);

    store.hdel("h", "a").await.unwrap();
    assert_eq!(store.hkeys("h").await.unwrap(), vec!["c"]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_lists_and_blocking_pop() {
    let store = store("list").await;
    store.lpush("q", "").await.unwrap();
    assert!(!store.exists("q").await.unwrap());

    store
        .lpush_n("q", &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("a"));
    assert_eq!(
        store.brpop("q", Duration::from_secs(1)).await.unwrap().as_deref(),
        Some("b")
    );
    assert_eq!(store.brpop("q", Duration::from_millis(100)).await.unwrap(), None);

    // a zero timeout pops once instead of blocking
    let popped = tokio::time::timeout(Duration::from_secs(2), store.brpop("q", Duration::ZERO))
        .await
        .expect("zero timeout must not block");
    assert_eq!(popped.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_sub_millisecond_ttl_is_accepted() {
    let store = store("blip").await;
    store
        .set_raw("k", "v", Duration::from_micros(300))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!store.exists("k").await.unwrap());

    store.set_raw("k2", "v", Duration::ZERO).await.unwrap();
    assert!(store.expire("k2", Duration::from_micros(300)).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_sorted_set() {
    let store = store("zset").await;
    for (score, member) in [(1.0, "a"), (2.0, "b"), (3.0, "c")] {
        store.zadd("z", score, member).await.unwrap();
    }

    let page = store
        .zrange_by_score("z", &ScoreRange::new("(1", "+inf").page(0, 1))
        .await
        .unwrap();
    assert_eq!(page, vec!["b"]);

    assert_eq!(store.zrem_range_by_score("z", "-inf", "2").await.unwrap(), 2);
    store.zrem("z", "c").await.unwrap();
    assert!(!store.exists("z").await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_concurrent_incr() {
    let store = store("ctr").await;
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
#[ignore = "requires Docker"]
async fn test_redis_cache_aside_writes_back() {
    let store = store("aside").await;
    let aside = CacheAside::new(store.clone());

    let user = aside
        .get_or_load("user:7", Duration::from_secs(60), || async {
            Ok(Some(User {
                id: 7,
                nickname: "trinity".into(),
            }))
        })
        .await
        .unwrap();
    assert_eq!(user.map(|u| u.id), Some(7));

    let cached: User = store.get("user:7").await.unwrap();
    assert_eq!(cached.nickname, "trinity");
}
