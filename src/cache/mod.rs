// 缓存模块
// 计数、验证码、会话、记住我令牌、文章热度都只存放在缓存中，依赖 TTL 自动过期

pub mod keys;
pub mod memory_store;
pub mod operations;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

pub use memory_store::MemoryCache;
pub use operations::{
    HeatCounter, RateLimitScope, RateLimiter, RememberTokenStore, SessionState, SessionStore,
    SessionUser, VerificationCodeStore,
};
pub use redis_store::RedisCache;

/// 带 TTL 的键值缓存，所有操作在后端存储上都是原子的
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 覆盖写入并设置过期时间
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 重置过期时间，键不存在时返回 false
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// 准入计数：键不存在时置 1 并设置 TTL；小于上限时加一；
    /// 达到上限时不再计数并返回 None
    async fn incr_capped(&self, key: &str, ttl: Duration, ceiling: u64) -> AppResult<Option<u64>>;

    /// 加一并把 TTL 刷新为 ttl（滑动过期），键不存在时从 1 开始
    async fn incr_sliding(&self, key: &str, ttl: Duration) -> AppResult<u64>;

    /// 键不存在时以 init 初始化，返回当前值
    async fn get_or_init(&self, key: &str, init: &str, ttl: Duration) -> AppResult<String>;
}
