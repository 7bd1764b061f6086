use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, keys};
use crate::error::AppResult;

/// 记住我令牌缓存操作
///
/// 令牌写入后在整个 TTL 内有效，使用时不续期也不轮换。
#[derive(Clone)]
pub struct RememberTokenStore {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl RememberTokenStore {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 缓存令牌，覆盖该用户之前的令牌
    pub async fn store(&self, username: &str, token: &str) -> AppResult<()> {
        self.cache
            .set_ex(&keys::remember_key(username), token, self.ttl)
            .await
    }

    pub async fn get(&self, username: &str) -> AppResult<Option<String>> {
        self.cache.get(&keys::remember_key(username)).await
    }

    /// 客户端令牌与缓存逐字节一致才算匹配，缺失视为不匹配
    pub async fn matches(&self, username: &str, presented: &str) -> AppResult<bool> {
        Ok(self
            .get(username)
            .await?
            .is_some_and(|cached| cached.as_bytes() == presented.as_bytes()))
    }
}
