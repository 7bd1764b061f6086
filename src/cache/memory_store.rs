use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::{AppError, AppResult};

const DEFAULT_CAPACITY: usize = 100_000;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 进程内缓存，单节点部署和测试使用
///
/// 所有操作在同一把锁内完成，因此与 Redis 实现一样是原子的。
/// 容量满时先清理过期键，仍然不够则淘汰最早过期的键。
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn make_room(&self, entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.len() < self.capacity || entries.contains_key(key) {
            return;
        }
        entries.retain(|_, e| e.live(now));
        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: String,
        ttl: Duration,
        now: Instant,
    ) {
        self.make_room(entries, key, now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }
}

fn live_value<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a str> {
    entries
        .get(key)
        .filter(|e| e.live(now))
        .map(|e| e.value.as_str())
}

fn parse_count(key: &str, value: &str) -> AppResult<u64> {
    value
        .parse()
        .map_err(|_| AppError::Upstream(format!("cache value at {} is not a counter", key)))
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(live_value(&entries, key, Instant::now()).map(str::to_string))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        self.insert(&mut entries, key, value.to_string(), ttl, Instant::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(e) if e.live(now) => {
                e.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_capped(&self, key: &str, ttl: Duration, ceiling: u64) -> AppResult<Option<u64>> {
        if ceiling == 0 {
            return Ok(None);
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let current = match live_value(&entries, key, now) {
            Some(v) => parse_count(key, v)?,
            None => {
                self.insert(&mut entries, key, "1".to_string(), ttl, now);
                return Ok(Some(1));
            }
        };
        if current >= ceiling {
            return Ok(None);
        }
        // 加一不改变原有过期时间
        if let Some(e) = entries.get_mut(key) {
            e.value = (current + 1).to_string();
        }
        Ok(Some(current + 1))
    }

    async fn incr_sliding(&self, key: &str, ttl: Duration) -> AppResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let next = match live_value(&entries, key, now) {
            Some(v) => parse_count(key, v)? + 1,
            None => 1,
        };
        self.insert(&mut entries, key, next.to_string(), ttl, now);
        Ok(next)
    }

    async fn get_or_init(&self, key: &str, init: &str, ttl: Duration) -> AppResult<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some(v) = live_value(&entries, key, now) {
            return Ok(v.to_string());
        }
        self.insert(&mut entries, key, init.to_string(), ttl, now);
        Ok(init.to_string())
    }
}
