//! 测试用的内存存储与配置
//!
//! 内存实现与 Postgres 实现遵循同样的约束：用户名、邮箱唯一，
//! 同一篇文章的 update_time 严格递增。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::database::{
    Article, ArticleStore, ArticleUpdate, Label, NewArticle, NewUser, Page, UserEntity, UserStore,
};
use crate::error::{AppError, AppResult};
use crate::mail::{MailSender, MockMailSender};
use crate::publish::{ArticleEvent, EventPublisher};
use crate::search::MemoryIndex;
use crate::{AppState, Collaborators};

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://test".to_string(),
        redis_url: "redis://test".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        api_base_uri: "/api".to_string(),
        server_secret: "test-secret".to_string(),
        register_ip_email_count: 3,
        register_day_email_count: 10,
        register_day_user_count: 10,
        article_day_count: 3,
        rate_limit_window_secs: 60,
        rate_limit_requests: 1000,
        session_ttl_secs: 60 * 60,
        remember_ttl_secs: 7 * 24 * 60 * 60,
        email_code_ttl_secs: 5 * 60,
        heat_ttl_secs: 7 * 24 * 60 * 60,
        cache_timeout_ms: 500,
        mail_timeout_ms: 1000,
        publish_timeout_ms: 1000,
        index_timeout_ms: 1000,
        smtp_url: None,
        mail_from: "noreply@test.local".to_string(),
        search_url: None,
        search_index: "blogs".to_string(),
        event_stream: "blogs:events".to_string(),
    }
}

/// 邮件发送桩：记录最后一次发送的验证码
#[derive(Default, Clone)]
pub struct RecordingMailSender {
    sent: Arc<Mutex<HashMap<String, String>>>,
}

impl RecordingMailSender {
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent.lock().unwrap().get(email).cloned()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send_code(&self, to: &str, code: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .insert(to.to_string(), code.to_string());
        Ok(())
    }
}

/// 邮件发送一律失败的桩
pub fn failing_mail_sender() -> MockMailSender {
    let mut sender = MockMailSender::new();
    sender
        .expect_send_code()
        .returning(|_, _| Err(AppError::Upstream("smtp down".into())));
    sender
}

/// 事件投递桩：按顺序记录所有事件
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<ArticleEvent>>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<ArticleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: ArticleEvent) -> AppResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
struct UserTables {
    users: Vec<UserEntity>,
    emails: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    tables: Mutex<UserTables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserEntity>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn email_registered(&self, email: &str) -> AppResult<bool> {
        Ok(self.tables.lock().unwrap().emails.contains_key(email))
    }

    async fn create(&self, user: NewUser) -> AppResult<UserEntity> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::DuplicateUsername);
        }
        if tables.emails.contains_key(&user.email) {
            return Err(AppError::EmailAlreadyRegistered);
        }
        let entity = UserEntity {
            id: tables.users.len() as i64 + 1,
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            add_time: Utc::now(),
        };
        tables.emails.insert(user.email, entity.id);
        tables.users.push(entity.clone());
        Ok(entity)
    }
}

#[derive(Default)]
struct ArticleTables {
    usernames: HashMap<i64, String>,
    labels: Vec<Label>,
    articles: Vec<Article>,
}

impl ArticleTables {
    /// 用户同名标签的 id，不存在时创建
    fn label_id(&mut self, user_id: i64, content: &str) -> i64 {
        if let Some(l) = self
            .labels
            .iter()
            .find(|l| l.user_id == user_id && l.content == content)
        {
            return l.id;
        }
        let id = self.labels.len() as i64 + 1;
        self.labels.push(Label {
            id,
            user_id,
            content: content.to_string(),
        });
        id
    }
}

#[derive(Default)]
pub struct MemoryArticleStore {
    tables: Mutex<ArticleTables>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记作者用户名，文章查询时用于填充 author
    pub fn add_user(&self, user_id: i64, username: &str) {
        self.tables
            .lock()
            .unwrap()
            .usernames
            .insert(user_id, username.to_string());
    }

    /// 把文章的发表时间改到指定时间，模拟跨天
    pub fn backdate(&self, id: i64, add_time: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(a) = tables.articles.iter_mut().find(|a| a.id == id) {
            a.add_time = add_time;
        }
    }

    pub fn label_count(&self) -> usize {
        self.tables.lock().unwrap().labels.len()
    }

    fn bump(article: &mut Article) {
        let floor = article.last_write() + ChronoDuration::milliseconds(1);
        article.update_time = Some(Utc::now().max(floor));
    }

    fn with_article<F>(&self, id: i64, f: F) -> AppResult<Article>
    where
        F: FnOnce(&mut Article, &mut ArticleTables),
    {
        let mut tables = self.tables.lock().unwrap();
        let mut article = tables
            .articles
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| AppError::Upstream("row not found".into()))?;
        f(&mut article, &mut *tables);
        if let Some(slot) = tables.articles.iter_mut().find(|a| a.id == id) {
            *slot = article.clone();
        }
        Ok(article)
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn issue_within_cap(
        &self,
        new: NewArticle,
        since: DateTime<Utc>,
        cap: u64,
    ) -> AppResult<Option<Article>> {
        let mut tables = self.tables.lock().unwrap();
        let issued = tables
            .articles
            .iter()
            .filter(|a| a.user_id == new.user_id && a.add_time >= since)
            .count() as u64;
        if issued >= cap {
            return Ok(None);
        }

        let label_id = tables.label_id(new.user_id, &new.label);
        let article = Article {
            id: tables.articles.len() as i64 + 1,
            user_id: new.user_id,
            author: tables
                .usernames
                .get(&new.user_id)
                .cloned()
                .unwrap_or_default(),
            label_id,
            label_content: new.label,
            title: new.title,
            html: new.html,
            public_show: new.public_show,
            delete_flag: false,
            add_time: Utc::now(),
            update_time: None,
        };
        tables.articles.push(article.clone());
        Ok(Some(article))
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Article>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn update(&self, id: i64, update: ArticleUpdate) -> AppResult<Article> {
        self.with_article(id, |article, tables| {
            article.label_id = tables.label_id(article.user_id, &update.label);
            article.label_content = update.label;
            article.title = update.title;
            article.html = update.html;
            article.public_show = update.public_show;
            Self::bump(article);
        })
    }

    async fn mark_deleted(&self, id: i64) -> AppResult<Article> {
        self.with_article(id, |article, _| {
            article.delete_flag = true;
            Self::bump(article);
        })
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Article>> {
        let tables = self.tables.lock().unwrap();
        let mut list: Vec<Article> = tables
            .articles
            .iter()
            .filter(|a| a.user_id == user_id && !a.delete_flag)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.add_time.cmp(&a.add_time).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn search_public(&self, query: &str, page: u64, size: u64) -> AppResult<Page<Article>> {
        let needle = query.trim().to_lowercase();
        let tables = self.tables.lock().unwrap();
        let mut hits: Vec<&Article> = tables
            .articles
            .iter()
            .filter(|a| a.indexable() && a.title.to_lowercase().contains(&needle))
            .collect();
        hits.sort_by(|a, b| b.add_time.cmp(&a.add_time).then(b.id.cmp(&a.id)));
        let total = hits.len() as u64;
        let list = hits
            .into_iter()
            .skip((page.saturating_sub(1) * size) as usize)
            .take(size as usize)
            .cloned()
            .collect();
        Ok(Page::new(total, size, list))
    }
}

/// 全部使用内存实现的应用状态
pub struct TestHarness {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub mail: RecordingMailSender,
    pub events: RecordingPublisher,
}

pub struct TestHarnessBuilder {
    config: Config,
}

impl TestHarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> TestHarness {
        let cache = Arc::new(MemoryCache::new());
        let users = Arc::new(MemoryUserStore::new());
        let articles = Arc::new(MemoryArticleStore::new());
        let index = Arc::new(MemoryIndex::new());
        let mail = RecordingMailSender::default();
        // 只记录事件，由测试显式交给索引同步
        let events = RecordingPublisher::default();

        let state = AppState::new(
            self.config,
            Collaborators {
                cache,
                users: users.clone(),
                articles,
                index,
                mail: Arc::new(mail.clone()),
                publisher: Arc::new(events.clone()),
            },
        );

        TestHarness {
            state,
            users,
            mail,
            events,
        }
    }
}
