use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::cache::{HeatCounter, RateLimitScope, SessionUser};
use crate::config::Config;
use crate::database::{Article, ArticleStore, ArticleUpdate, NewArticle, Page};
use crate::error::{AppError, AppResult};
use crate::publish::{ArticleEvent, ArticlePublisher};
use crate::search::{ArticleDocument, SearchIndex};

const MAX_PAGE_SIZE: u64 = 50;
const MAX_TITLE_CHARS: usize = 100;
const MAX_LABEL_CHARS: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleForm {
    pub title: String,
    pub html: String,
    /// 标签内容，用户没有该标签时自动创建
    pub label: String,
    #[serde(default)]
    pub public_show: bool,
}

impl ArticleForm {
    fn validate(&self) -> AppResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("标题不能为空"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::validation("标题过长"));
        }
        if self.html.trim().is_empty() {
            return Err(AppError::validation("正文不能为空"));
        }
        let label = self.label.trim();
        if label.is_empty() {
            return Err(AppError::validation("请选择或填写标签"));
        }
        if label.chars().count() > MAX_LABEL_CHARS {
            return Err(AppError::validation("标签过长"));
        }
        Ok(())
    }
}

/// 文章与当前热度
#[derive(Debug, Clone, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub heat: u64,
}

/// 分页参数检查，page 从 1 开始
pub fn check_page(page: u64, size: u64) -> AppResult<()> {
    if page == 0 {
        return Err(AppError::validation("页码从 1 开始"));
    }
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::validation(format!(
            "每页条数须在 1 到 {} 之间",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

/// 本地时间当天零点
fn start_of_today() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) - chrono::Duration::days(1))
}

/// 文章读写与发布
///
/// 写入提交后才投递索引事件，投递失败不回滚写入。
#[derive(Clone)]
pub struct ArticleService {
    articles: Arc<dyn ArticleStore>,
    index: Arc<dyn SearchIndex>,
    heat: HeatCounter,
    publisher: ArticlePublisher,
    config: Arc<Config>,
}

impl ArticleService {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        index: Arc<dyn SearchIndex>,
        heat: HeatCounter,
        publisher: ArticlePublisher,
        config: Arc<Config>,
    ) -> Self {
        Self {
            articles,
            index,
            heat,
            publisher,
            config,
        }
    }

    /// 读取作者本人未删除的文章，其他情况一律视为不存在
    async fn owned(&self, user: &SessionUser, id: i64) -> AppResult<Article> {
        match self.articles.find_by_id(id).await? {
            Some(article) if !article.delete_flag && article.user_id == user.id => Ok(article),
            _ => Err(AppError::NotFoundOrForbidden),
        }
    }

    pub async fn issue(&self, user: &SessionUser, form: ArticleForm) -> AppResult<Article> {
        form.validate()?;

        let article = self
            .articles
            .issue_within_cap(
                NewArticle {
                    user_id: user.id,
                    label: form.label.trim().to_string(),
                    title: form.title.trim().to_string(),
                    html: form.html,
                    public_show: form.public_show,
                },
                start_of_today(),
                self.config.article_day_count,
            )
            .await?
            .ok_or_else(|| {
                tracing::info!("User {} reached the daily article cap", user.username);
                AppError::RateLimitExceeded(RateLimitScope::ArticleIssue)
            })?;
        tracing::info!("User {} issued article {}", user.username, article.id);

        if article.indexable() {
            self.publisher.emit(ArticleEvent::upsert(&article)).await;
        }
        Ok(article)
    }

    pub async fn update(&self, user: &SessionUser, id: i64, form: ArticleForm) -> AppResult<Article> {
        form.validate()?;
        let before = self.owned(user, id).await?;

        let article = self
            .articles
            .update(
                id,
                ArticleUpdate {
                    label: form.label.trim().to_string(),
                    title: form.title.trim().to_string(),
                    html: form.html,
                    public_show: form.public_show,
                },
            )
            .await?;

        if article.indexable() {
            self.publisher.emit(ArticleEvent::upsert(&article)).await;
        } else if before.indexable() {
            // 公开转私密，需要从索引中移除
            self.publisher.emit(ArticleEvent::delete(&article)).await;
        }
        Ok(article)
    }

    /// 逻辑删除
    pub async fn delete(&self, user: &SessionUser, id: i64) -> AppResult<()> {
        let before = self.owned(user, id).await?;
        let article = self.articles.mark_deleted(id).await?;
        tracing::info!("User {} deleted article {}", user.username, id);

        if before.public_show {
            self.publisher.emit(ArticleEvent::delete(&article)).await;
        }
        Ok(())
    }

    /// 阅读文章并增加热度；私密文章只有作者本人可见
    pub async fn view(&self, viewer: Option<&SessionUser>, id: i64) -> AppResult<ArticleView> {
        let article = match self.articles.find_by_id(id).await? {
            Some(a) if !a.delete_flag => a,
            _ => return Err(AppError::NotFoundOrForbidden),
        };
        let is_author = viewer.is_some_and(|v| v.id == article.user_id);
        if !article.public_show && !is_author {
            return Err(AppError::NotFoundOrForbidden);
        }

        let heat = self.heat.touch(&article.author, article.id).await?;
        Ok(ArticleView { article, heat })
    }

    /// 我的文章列表，只读取热度不计数
    pub async fn list_mine(&self, user: &SessionUser) -> AppResult<Vec<ArticleView>> {
        let articles = self.articles.list_by_user(user.id).await?;
        let heats = try_join_all(
            articles
                .iter()
                .map(|a| self.heat.peek(&a.author, a.id)),
        )
        .await?;

        Ok(articles
            .into_iter()
            .zip(heats)
            .map(|(article, heat)| ArticleView { article, heat })
            .collect())
    }

    /// 直接查库分页
    pub async fn search_store(&self, query: &str, page: u64, size: u64) -> AppResult<Page<Article>> {
        check_page(page, size)?;
        self.articles.search_public(query, page, size).await
    }

    /// 查询搜索索引，与数据库之间存在同步延迟
    pub async fn search_index(
        &self,
        query: &str,
        page: u64,
        size: u64,
    ) -> AppResult<Page<ArticleDocument>> {
        check_page(page, size)?;
        tokio::time::timeout(
            self.config.index_timeout(),
            self.index.search(query, page, size),
        )
        .await?
    }
}
