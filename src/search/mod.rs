//! 文章搜索索引
//!
//! 索引与数据库之间只保证最终一致：文章写入后由发布管道异步同步，
//! 同步延迟期间两种分页查询的结果可能不一致。

pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{Article, Page};
use crate::error::AppResult;

pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;

/// 索引中的文章文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDocument {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub label_content: String,
    pub add_time: DateTime<Utc>,
    /// 文章最后写入时间（毫秒），用作版本号
    pub version: i64,
}

impl From<&Article> for ArticleDocument {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            author: article.author.clone(),
            label_content: article.label_content.clone(),
            add_time: article.add_time,
            version: article.last_write().timestamp_millis(),
        }
    }
}

/// 搜索索引接口
///
/// 写入按版本号后写优先：版本不大于已应用版本的写入被忽略，
/// 因此重复投递和乱序投递都会收敛到同一状态。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, doc: ArticleDocument) -> AppResult<()>;

    async fn delete(&self, id: i64, version: i64) -> AppResult<()>;

    /// 在标题、作者、标签中匹配，query 为空时返回全部
    async fn search(&self, query: &str, page: u64, size: u64) -> AppResult<Page<ArticleDocument>>;
}
