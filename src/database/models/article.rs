use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 文章数据库实体，附带作者用户名与标签内容
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub user_id: i64,
    pub author: String,
    pub label_id: i64,
    pub label_content: String,
    pub title: String,
    pub html: String,
    pub public_show: bool,
    pub delete_flag: bool,
    pub add_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Article {
    /// 最后一次写入的时间，作为索引同步的版本号
    pub fn last_write(&self) -> DateTime<Utc> {
        self.update_time.unwrap_or(self.add_time)
    }

    pub fn indexable(&self) -> bool {
        self.public_show && !self.delete_flag
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Label {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
}

/// 新文章，标签按内容给出，不存在时随文章一起创建
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub user_id: i64,
    pub label: String,
    pub title: String,
    pub html: String,
    pub public_show: bool,
}

#[derive(Debug, Clone)]
pub struct ArticleUpdate {
    pub label: String,
    pub title: String,
    pub html: String,
    pub public_show: bool,
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub pages: u64,
    pub list: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total: u64, size: u64, list: Vec<T>) -> Self {
        let pages = if size == 0 { 0 } else { total.div_ceil(size) };
        Self { total, pages, list }
    }
}
