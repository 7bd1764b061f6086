use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheStore, keys};
use crate::error::AppResult;

/// 会话中保存的登录用户，也是请求处理链路中显式传递的身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub nickname: String,
}

/// 会话缓存数据模型
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    /// 登录图形验证码
    pub verify_code: Option<String>,
}

/// 会话缓存操作，空闲超时由缓存 TTL 保证
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// 创建新会话，返回会话 id
    pub async fn create(&self, state: &SessionState) -> AppResult<String> {
        let session_id = Uuid::new_v4().to_string();
        self.save(&session_id, state).await?;
        Ok(session_id)
    }

    pub async fn save(&self, session_id: &str, state: &SessionState) -> AppResult<()> {
        let json = serde_json::to_string(state)?;
        self.cache
            .set_ex(&keys::session_key(session_id), &json, self.ttl)
            .await
    }

    /// 读取会话并刷新过期时间
    pub async fn load(&self, session_id: &str) -> AppResult<Option<SessionState>> {
        let key = keys::session_key(session_id);
        let Some(json) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        self.cache.expire(&key, self.ttl).await?;

        match serde_json::from_str(&json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!("Dropping unreadable session {}: {}", session_id, e);
                self.cache.delete(&key).await?;
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, session_id: &str) -> AppResult<()> {
        self.cache.delete(&keys::session_key(session_id)).await
    }
}
