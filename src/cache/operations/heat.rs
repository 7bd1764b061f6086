use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, keys};
use crate::error::{AppError, AppResult};

/// 文章热度计数，只存在于缓存中
///
/// 近似值：缓存过期或丢失后从 1 重新计数，不回源持久化存储。
#[derive(Clone)]
pub struct HeatCounter {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl HeatCounter {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// 浏览一次：加一并刷新 TTL，返回新的热度
    pub async fn touch(&self, author: &str, article_id: i64) -> AppResult<u64> {
        self.cache
            .incr_sliding(&keys::heat_key(author, article_id), self.ttl)
            .await
    }

    /// 只读热度，不存在时初始化为 1
    pub async fn peek(&self, author: &str, article_id: i64) -> AppResult<u64> {
        let key = keys::heat_key(author, article_id);
        let value = self.cache.get_or_init(&key, "1", self.ttl).await?;
        value
            .parse()
            .map_err(|_| AppError::Upstream(format!("heat value at {} is not a number", key)))
    }
}
