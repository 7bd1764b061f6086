//! 文章发布管道
//!
//! 文章写入数据库后投递事件，由 [`IndexSyncWorker`] 异步同步到搜索索引。
//! 投递失败只记录日志，不影响已经提交的写入。

pub mod worker;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::mpsc;

use crate::database::Article;
use crate::error::{AppError, AppResult};

pub use worker::IndexSyncWorker;

pub const UPSERT_ROUTING_KEY: &str = "article.upsert";
pub const DELETE_ROUTING_KEY: &str = "article.delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Upsert,
    Delete,
}

impl EventKind {
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventKind::Upsert => UPSERT_ROUTING_KEY,
            EventKind::Delete => DELETE_ROUTING_KEY,
        }
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            UPSERT_ROUTING_KEY => Ok(EventKind::Upsert),
            DELETE_ROUTING_KEY => Ok(EventKind::Delete),
            other => Err(AppError::Upstream(format!("unknown routing key {}", other))),
        }
    }
}

/// 文章事件，携带文章 id 与最后写入时间（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleEvent {
    pub kind: EventKind,
    pub article_id: i64,
    pub updated_at: i64,
}

impl ArticleEvent {
    pub fn upsert(article: &Article) -> Self {
        Self {
            kind: EventKind::Upsert,
            article_id: article.id,
            updated_at: article.last_write().timestamp_millis(),
        }
    }

    pub fn delete(article: &Article) -> Self {
        Self {
            kind: EventKind::Delete,
            article_id: article.id,
            updated_at: article.last_write().timestamp_millis(),
        }
    }
}

impl fmt::Display for ArticleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}@{})",
            self.kind.routing_key(),
            self.article_id,
            self.updated_at
        )
    }
}

/// 事件投递接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: ArticleEvent) -> AppResult<()>;
}

/// 基于 Redis Stream 的投递，消费端使用消费组实现至少一次投递
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    stream: String,
}

impl RedisStreamPublisher {
    pub async fn connect(client: &redis::Client, stream: &str) -> redis::RedisResult<Self> {
        Ok(Self {
            conn: client.get_multiplexed_async_connection().await?,
            stream: stream.to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: ArticleEvent) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let fields = [
            ("routing_key", event.kind.routing_key().to_string()),
            ("article_id", event.article_id.to_string()),
            ("updated_at", event.updated_at.to_string()),
        ];
        let _: String = conn.xadd(&self.stream, "*", &fields).await?;
        Ok(())
    }
}

/// 进程内投递，单节点部署与测试使用
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<ArticleEvent>,
}

impl ChannelPublisher {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ArticleEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: ArticleEvent) -> AppResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AppError::Upstream("index sync worker is gone".to_string()))
    }
}

/// 写路径使用的投递入口：带超时，失败只告警
#[derive(Clone)]
pub struct ArticlePublisher {
    inner: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl ArticlePublisher {
    pub fn new(inner: Arc<dyn EventPublisher>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// 返回是否投递成功，调用方不应因失败回滚
    pub async fn emit(&self, event: ArticleEvent) -> bool {
        let result = match tokio::time::timeout(self.timeout, self.inner.publish(event)).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        match result {
            Ok(()) => {
                tracing::debug!("Published {}", event);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to publish {}, search index will lag: {}", event, e);
                false
            }
        }
    }
}
