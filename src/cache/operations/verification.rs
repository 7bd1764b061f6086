use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, keys};
use crate::error::AppResult;
use crate::utils::sha256_hex;

/// 邮箱验证码缓存操作
///
/// 每个邮箱最多一个有效验证码，重新发送时覆盖。缓存中只保存验证码摘要。
#[derive(Clone)]
pub struct VerificationCodeStore {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl VerificationCodeStore {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn put(&self, email: &str, code: &str) -> AppResult<()> {
        self.cache
            .set_ex(&keys::email_code_key(email), &sha256_hex(code), self.ttl)
            .await
    }

    /// 过期或不存在都按不匹配处理
    pub async fn matches(&self, email: &str, submitted: &str) -> AppResult<bool> {
        let stored = self.cache.get(&keys::email_code_key(email)).await?;
        Ok(stored.is_some_and(|digest| digest == sha256_hex(submitted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

    #[tokio::test]
    async fn plaintext_code_never_reaches_the_cache() {
        let cache = Arc::new(MemoryCache::new());
        let store = VerificationCodeStore::new(cache.clone(), FIVE_MINUTES);
        store.put("a@b.cn", "123456").await.unwrap();

        let raw = cache.get(&keys::email_code_key("a@b.cn")).await.unwrap().unwrap();
        assert_ne!(raw, "123456");
        assert!(store.matches("a@b.cn", "123456").await.unwrap());
    }

    #[tokio::test]
    async fn reissue_overwrites_previous_code() {
        let store = VerificationCodeStore::new(Arc::new(MemoryCache::new()), FIVE_MINUTES);
        store.put("a@b.cn", "111111").await.unwrap();
        store.put("a@b.cn", "222222").await.unwrap();

        assert!(!store.matches("a@b.cn", "111111").await.unwrap());
        assert!(store.matches("a@b.cn", "222222").await.unwrap());
    }
}
