use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::database::models::article::{Article, ArticleUpdate, NewArticle, Page};
use crate::error::AppResult;

/// 文章存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// 发表文章：统计 since 以来的篇数、创建标签、写入文章在同一事务内完成。
    /// 已达 cap 时不写入任何数据，返回 None
    async fn issue_within_cap(
        &self,
        article: NewArticle,
        since: DateTime<Utc>,
        cap: u64,
    ) -> AppResult<Option<Article>>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Article>>;

    /// 更新文章并按需创建标签，同一事务内完成；update_time 对同一篇文章严格递增
    async fn update(&self, id: i64, update: ArticleUpdate) -> AppResult<Article>;

    /// 逻辑删除
    async fn mark_deleted(&self, id: i64) -> AppResult<Article>;

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Article>>;

    /// 直接查库的公开文章分页，按标题模糊匹配
    async fn search_public(&self, query: &str, page: u64, size: u64) -> AppResult<Page<Article>>;
}

const ARTICLE_COLUMNS: &str = r#"
    a.id, a.user_id, u.username AS author, a.label_id, l.content AS label_content,
    a.title, a.html, a.public_show, a.delete_flag, a.add_time, a.update_time
"#;

const ARTICLE_JOINS: &str = r#"
    FROM articles a
    JOIN users u ON u.id = a.user_id
    JOIN labels l ON l.id = a.label_id
"#;

/// 文章存储库 Postgres 实现
#[derive(Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: i64) -> AppResult<Option<Article>> {
        let query = format!("SELECT {} {} WHERE a.id = $1", ARTICLE_COLUMNS, ARTICLE_JOINS);
        let article = sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    async fn fetch_existing(&self, id: i64) -> AppResult<Article> {
        self.fetch(id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }
}

/// 标签不存在时创建，返回标签 id。并发创建同名标签时以已存在的为准
async fn upsert_label(conn: &mut PgConnection, user_id: i64, content: &str) -> AppResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO labels (user_id, content)
        VALUES ($1, $2)
        ON CONFLICT (user_id, content) DO UPDATE SET content = EXCLUDED.content
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(content)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn issue_within_cap(
        &self,
        article: NewArticle,
        since: DateTime<Utc>,
        cap: u64,
    ) -> AppResult<Option<Article>> {
        let mut tx = self.pool.begin().await?;

        // 同一用户的发表串行执行，计数与写入之间不会插入其他写入
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(article.user_id)
            .execute(&mut *tx)
            .await?;

        let issued: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE user_id = $1 AND add_time >= $2")
                .bind(article.user_id)
                .bind(since)
                .fetch_one(&mut *tx)
                .await?;
        if issued.max(0) as u64 >= cap {
            tx.rollback().await?;
            return Ok(None);
        }

        let label_id = upsert_label(&mut tx, article.user_id, &article.label).await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (user_id, label_id, title, html, public_show, delete_flag, add_time)
            VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
            RETURNING id
            "#,
        )
        .bind(article.user_id)
        .bind(label_id)
        .bind(&article.title)
        .bind(&article.html)
        .bind(article.public_show)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_existing(id).await.map(Some)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Article>> {
        self.fetch(id).await
    }

    async fn update(&self, id: i64, update: ArticleUpdate) -> AppResult<Article> {
        let mut tx = self.pool.begin().await?;

        let user_id: i64 =
            sqlx::query_scalar("SELECT user_id FROM articles WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        let label_id = upsert_label(&mut tx, user_id, &update.label).await?;

        sqlx::query(
            r#"
            UPDATE articles
            SET label_id = $1, title = $2, html = $3, public_show = $4,
                update_time = GREATEST(NOW(), COALESCE(update_time, add_time) + INTERVAL '1 millisecond')
            WHERE id = $5
            "#,
        )
        .bind(label_id)
        .bind(&update.title)
        .bind(&update.html)
        .bind(update.public_show)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_existing(id).await
    }

    async fn mark_deleted(&self, id: i64) -> AppResult<Article> {
        sqlx::query(
            r#"
            UPDATE articles
            SET delete_flag = TRUE,
                update_time = GREATEST(NOW(), COALESCE(update_time, add_time) + INTERVAL '1 millisecond')
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.fetch_existing(id).await
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Article>> {
        let query = format!(
            "SELECT {} {} WHERE a.user_id = $1 AND NOT a.delete_flag ORDER BY a.add_time DESC",
            ARTICLE_COLUMNS, ARTICLE_JOINS
        );
        let articles = sqlx::query_as::<_, Article>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn search_public(&self, query: &str, page: u64, size: u64) -> AppResult<Page<Article>> {
        let pattern = like_pattern(query.trim());
        let filter = "WHERE a.public_show AND NOT a.delete_flag AND a.title ILIKE $1";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {} {}", ARTICLE_JOINS, filter))
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let list_query = format!(
            "SELECT {} {} {} ORDER BY a.add_time DESC LIMIT $2 OFFSET $3",
            ARTICLE_COLUMNS, ARTICLE_JOINS, filter
        );
        let list = sqlx::query_as::<_, Article>(&list_query)
            .bind(&pattern)
            .bind(size as i64)
            .bind((page.saturating_sub(1) * size) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(total.max(0) as u64, size, list))
    }
}
