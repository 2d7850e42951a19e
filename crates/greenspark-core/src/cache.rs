//! Read-through cache
//!
//! Entries are JSON strings keyed by `[namespace:][v{version}:]{schema}:{pk}`.
//! Writers invalidate the keys they touch; readers fall back to the loader on
//! any miss. A failing backend is logged and treated as a miss so the cache
//! can never take a request down.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::error::{Error, Result};

/// Kinds of cached documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSchema {
    BillDetail,
    InsightReport,
    CatalogList,
    ApplianceView,
}

impl CacheSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BillDetail => "bill_detail",
            Self::InsightReport => "insight_report",
            Self::CatalogList => "catalog",
            Self::ApplianceView => "appliance",
        }
    }
}

/// Storage behind the cache service
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`, returning how many went
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Drop expired entries. Backends that expire keys themselves keep the default.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }

    async fn ping(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// In-process TTL map
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Unavailable("memory cache lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.lock()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.shrink_to_fit();
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis through an auto-reconnecting connection manager
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(Duration::from_secs(5), client.get_connection_manager())
            .await
            .map_err(|_| Error::Unavailable(format!("Timed out connecting to Redis at {}", url)))??;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let n: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                deleted += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(deleted)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Typed cache front-end shared by handlers and jobs
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    settings: CacheSettings,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self { backend, settings }
    }

    pub fn memory(settings: CacheSettings) -> Self {
        Self::new(Arc::new(MemoryCache::new()), settings)
    }

    /// Redis when `REDIS_URL` is set and reachable, otherwise in-memory
    pub async fn from_env(settings: CacheSettings) -> Self {
        match std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty()) {
            Some(url) => match RedisCache::connect(&url).await {
                Ok(redis) => {
                    info!("Cache backend: redis");
                    Self::new(Arc::new(redis), settings)
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, using in-memory cache");
                    Self::memory(settings)
                }
            },
            None => Self::memory(settings),
        }
    }

    fn prefix(&self, schema: CacheSchema) -> String {
        let mut key = String::new();
        if let Some(ref ns) = self.settings.namespace {
            key.push_str(ns);
            key.push(':');
        }
        if let Some(v) = self.settings.version {
            key.push_str(&format!("v{}:", v));
        }
        key.push_str(schema.as_str());
        key.push(':');
        key
    }

    pub fn key(&self, schema: CacheSchema, pk: &str) -> String {
        format!("{}{}", self.prefix(schema), pk)
    }

    fn ttl(&self, schema: CacheSchema) -> Duration {
        self.settings
            .ttl_overrides
            .get(schema.as_str())
            .copied()
            .unwrap_or(self.settings.default_ttl)
    }

    pub async fn get<T: DeserializeOwned>(&self, schema: CacheSchema, pk: &str) -> Option<T> {
        let key = self.key(schema, pk);
        match self.backend.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    let _ = self.backend.delete(&key).await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, schema: CacheSchema, pk: &str, value: &T) {
        let key = self.key(schema, pk);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.backend.set_ex(&key, &raw, self.ttl(schema)).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    pub async fn invalidate(&self, schema: CacheSchema, pk: &str) {
        let key = self.key(schema, pk);
        if let Err(e) = self.backend.delete(&key).await {
            warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }

    /// Drop every entry of a schema
    pub async fn invalidate_schema(&self, schema: CacheSchema) {
        let prefix = self.prefix(schema);
        if let Err(e) = self.backend.delete_prefix(&prefix).await {
            warn!(prefix = %prefix, error = %e, "Cache invalidation failed");
        }
    }

    /// Return the cached value or load, store and return it
    pub async fn get_or_set<T, F, Fut>(&self, schema: CacheSchema, pk: &str, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(schema, pk).await {
            return Ok(hit);
        }
        let value = loader().await?;
        self.set(schema, pk, &value).await;
        Ok(value)
    }

    /// Drop expired entries, returning how many went
    pub async fn purge_expired(&self) -> u64 {
        match self.backend.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Cache purge failed");
                0
            }
        }
    }

    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Unavailable("down".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::Unavailable("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::Unavailable("down".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(Error::Unavailable("down".into()))
        }
        async fn ping(&self) -> bool {
            false
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_key_layout() {
        let cache = CacheService::memory(CacheSettings::default());
        assert_eq!(
            cache.key(CacheSchema::BillDetail, "abc"),
            "greenspark:v1:bill_detail:abc"
        );

        let bare = CacheService::memory(CacheSettings {
            namespace: None,
            version: None,
            ..CacheSettings::default()
        });
        assert_eq!(bare.key(CacheSchema::CatalogList, "all"), "catalog:all");
    }

    #[test]
    fn test_ttl_override() {
        let mut settings = CacheSettings::default();
        settings
            .ttl_overrides
            .insert("catalog".to_string(), Duration::from_secs(3600));
        let cache = CacheService::memory(settings);
        assert_eq!(cache.ttl(CacheSchema::CatalogList), Duration::from_secs(3600));
        assert_eq!(cache.ttl(CacheSchema::BillDetail), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_memory_expiry() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_drops_unread_expired_entries() {
        let memory = MemoryCache::new();
        let cache = CacheService::new(Arc::new(memory.clone()), CacheSettings::default());
        for i in 0..10 {
            memory
                .set_ex(&format!("old:{}", i), "v", Duration::from_millis(10))
                .await
                .unwrap();
        }
        memory.set_ex("fresh", "v", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(memory.len(), 11);
        assert_eq!(cache.purge_expired().await, 10);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.get("fresh").await.unwrap().as_deref(), Some("v"));

        let broken = CacheService::new(Arc::new(BrokenBackend), CacheSettings::default());
        assert_eq!(broken.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_get_or_set_loads_once() {
        let cache = CacheService::memory(CacheSettings::default());
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value: Vec<i32> = cache
                .get_or_set(CacheSchema::CatalogList, "all", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(CacheSchema::CatalogList, "all").await;
        assert_eq!(cache.get::<Vec<i32>>(CacheSchema::CatalogList, "all").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_schema() {
        let cache = CacheService::memory(CacheSettings::default());
        cache.set(CacheSchema::CatalogList, "all", &1).await;
        cache.set(CacheSchema::CatalogList, "fan", &2).await;
        cache.set(CacheSchema::BillDetail, "b1", &3).await;
        cache.invalidate_schema(CacheSchema::CatalogList).await;
        assert_eq!(cache.get::<i32>(CacheSchema::CatalogList, "fan").await, None);
        assert_eq!(cache.get::<i32>(CacheSchema::BillDetail, "b1").await, Some(3));
    }

    #[tokio::test]
    async fn test_broken_backend_is_a_miss() {
        let cache = CacheService::new(Arc::new(BrokenBackend), CacheSettings::default());
        assert_eq!(cache.get::<i32>(CacheSchema::BillDetail, "x").await, None);
        cache.set(CacheSchema::BillDetail, "x", &1).await;
        let value: i32 = cache
            .get_or_set(CacheSchema::BillDetail, "x", || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(!cache.ping().await);
    }
}
