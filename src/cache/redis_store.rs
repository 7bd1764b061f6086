use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult, Script, aio::MultiplexedConnection};

use super::CacheStore;
use crate::error::AppResult;

/// 准入计数脚本，读取与加一在 Redis 内原子完成，并发请求不会越过上限
const INCR_CAPPED_LUA: &str = r#"
local ceiling = tonumber(ARGV[2])
if ceiling <= 0 then
    return -1
end
local current = redis.call('GET', KEYS[1])
if not current then
    redis.call('SET', KEYS[1], 1, 'EX', ARGV[1])
    return 1
end
if tonumber(current) >= ceiling then
    return -1
end
return redis.call('INCR', KEYS[1])
"#;

/// Redis 缓存实现
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    incr_capped: Script,
    timeout: Duration,
}

impl RedisCache {
    pub async fn connect(client: &redis::Client, timeout: Duration) -> RedisResult<Self> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            incr_capped: Script::new(INCR_CAPPED_LUA),
            timeout,
        })
    }

    /// 每次往返都受超时约束，超时按上游错误返回
    async fn within<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> AppResult<T> {
        Ok(tokio::time::timeout(self.timeout, fut).await??)
    }
}

fn secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.within(async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        self.within(async move { conn.set_ex(key, value, secs(ttl)).await })
            .await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        self.within(async move { conn.del(key).await }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        self.within(async move { conn.expire(key, secs(ttl) as i64).await })
            .await
    }

    async fn incr_capped(&self, key: &str, ttl: Duration, ceiling: u64) -> AppResult<Option<u64>> {
        let mut conn = self.conn.clone();
        let script = &self.incr_capped;
        let count: i64 = self
            .within(async move {
                script
                    .key(key)
                    .arg(secs(ttl))
                    .arg(ceiling)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok((count > 0).then_some(count as u64))
    }

    async fn incr_sliding(&self, key: &str, ttl: Duration) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = self
            .within(async move {
                redis::pipe()
                    .atomic()
                    .incr(key, 1)
                    .expire(key, secs(ttl) as i64)
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(count)
    }

    async fn get_or_init(&self, key: &str, init: &str, ttl: Duration) -> AppResult<String> {
        let mut conn = self.conn.clone();
        let (value,): (String,) = self
            .within(async move {
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(key)
                    .arg(init)
                    .arg("NX")
                    .arg("EX")
                    .arg(secs(ttl))
                    .ignore()
                    .get(key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(value)
    }
}
