use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::{
    AsyncCommands,
    aio::MultiplexedConnection,
    streams::{StreamId, StreamReadOptions, StreamReadReply},
};
use tokio::sync::mpsc;

use super::{ArticleEvent, EventKind};
use crate::database::ArticleStore;
use crate::error::{AppError, AppResult};
use crate::search::{ArticleDocument, SearchIndex};

const CONSUMER_GROUP: &str = "search-index";
const READ_BATCH: usize = 32;
const BLOCK_MS: usize = 5000;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// 搜索索引同步消费者
///
/// 处理是幂等的：Upsert 总是按数据库中文章的当前状态写入索引，
/// 索引再按版本号做后写优先，重复或乱序的事件最终收敛到同一结果。
#[derive(Clone)]
pub struct IndexSyncWorker {
    articles: Arc<dyn ArticleStore>,
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl IndexSyncWorker {
    pub fn new(articles: Arc<dyn ArticleStore>, index: Arc<dyn SearchIndex>, timeout: Duration) -> Self {
        Self {
            articles,
            index,
            timeout,
        }
    }

    pub async fn apply(&self, event: ArticleEvent) -> AppResult<()> {
        tokio::time::timeout(self.timeout, self.apply_inner(event)).await?
    }

    async fn apply_inner(&self, event: ArticleEvent) -> AppResult<()> {
        match event.kind {
            EventKind::Delete => self.index.delete(event.article_id, event.updated_at).await,
            EventKind::Upsert => match self.articles.find_by_id(event.article_id).await? {
                Some(article) if article.indexable() => {
                    self.index.upsert(ArticleDocument::from(&article)).await
                }
                // 文章已删除或转为私密，按其当前版本从索引移除
                Some(article) => {
                    self.index
                        .delete(article.id, article.last_write().timestamp_millis())
                        .await
                }
                None => self.index.delete(event.article_id, event.updated_at).await,
            },
        }
    }

    /// 消费进程内通道，通道关闭后退出
    pub async fn run_channel(self, mut rx: mpsc::Receiver<ArticleEvent>) {
        tracing::info!("Index sync worker started on in-process channel");
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.apply(event).await {
                tracing::warn!("Retrying {} after failure: {}", event, e);
                tokio::time::sleep(RETRY_DELAY).await;
                if let Err(e) = self.apply(event).await {
                    tracing::error!("Dropping {}: {}", event, e);
                }
            }
        }
        tracing::info!("Index sync worker stopped");
    }

    /// 消费 Redis Stream，处理成功后 XACK；失败的消息留在待处理列表中稍后重读
    pub async fn run_stream(self, mut conn: MultiplexedConnection, stream: String, consumer: String) {
        if let Err(e) = ensure_group(&mut conn, &stream).await {
            tracing::error!("Cannot create consumer group on {}: {}", stream, e);
            return;
        }
        tracing::info!("Index sync worker {} consuming {}", consumer, stream);

        // 启动时先处理上次未确认的消息
        let mut replay_pending = true;
        loop {
            let start_id = if replay_pending { "0" } else { ">" };
            let opts = StreamReadOptions::default()
                .group(CONSUMER_GROUP, &consumer)
                .count(READ_BATCH)
                .block(BLOCK_MS);

            let reply: StreamReadReply = match conn.xread_options(&[&stream], &[start_id], &opts).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Failed to read {}: {}", stream, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let entries: Vec<StreamId> = reply.keys.into_iter().flat_map(|k| k.ids).collect();
            if replay_pending && entries.is_empty() {
                replay_pending = false;
                continue;
            }

            let mut failed = false;
            for entry in entries {
                match self.handle_entry(&mut conn, &stream, &entry).await {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!("Stream entry {} left pending: {}", entry.id, e);
                        failed = true;
                    }
                }
            }
            if failed {
                replay_pending = true;
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    async fn handle_entry(
        &self,
        conn: &mut MultiplexedConnection,
        stream: &str,
        entry: &StreamId,
    ) -> AppResult<()> {
        match parse_entry(&entry.map) {
            Ok(event) => self.apply(event).await?,
            // 无法解析的消息重试也没有意义，确认掉
            Err(e) => tracing::error!("Discarding malformed entry {}: {}", entry.id, e),
        }
        let _: i64 = conn.xack(stream, CONSUMER_GROUP, &[&entry.id]).await?;
        Ok(())
    }
}

async fn ensure_group(conn: &mut MultiplexedConnection, stream: &str) -> redis::RedisResult<()> {
    let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, CONSUMER_GROUP, "0").await;
    match created {
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        other => other,
    }
}

fn field(map: &HashMap<String, redis::Value>, name: &str) -> AppResult<String> {
    map.get(name)
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
        .ok_or_else(|| AppError::Upstream(format!("missing field {}", name)))
}

fn parse_entry(map: &HashMap<String, redis::Value>) -> AppResult<ArticleEvent> {
    let kind: EventKind = field(map, "routing_key")?.parse()?;
    let article_id = field(map, "article_id")?
        .parse()
        .map_err(|_| AppError::Upstream("article_id is not a number".to_string()))?;
    let updated_at = field(map, "updated_at")?
        .parse()
        .map_err(|_| AppError::Upstream("updated_at is not a number".to_string()))?;

    Ok(ArticleEvent {
        kind,
        article_id,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ArticleUpdate, NewArticle};
    use crate::publish::{ChannelPublisher, EventPublisher};
    use crate::search::{MemoryIndex, MockSearchIndex};
    use crate::test_utils::MemoryArticleStore;

    struct Fixture {
        articles: Arc<MemoryArticleStore>,
        index: Arc<MemoryIndex>,
        worker: IndexSyncWorker,
    }

    fn fixture() -> Fixture {
        let articles = Arc::new(MemoryArticleStore::new());
        let index = Arc::new(MemoryIndex::new());
        let worker = IndexSyncWorker::new(articles.clone(), index.clone(), Duration::from_secs(1));
        Fixture {
            articles,
            index,
            worker,
        }
    }

    async fn public_article(articles: &MemoryArticleStore, title: &str) -> crate::database::Article {
        articles.add_user(1, "alice");
        articles
            .issue_within_cap(
                NewArticle {
                    user_id: 1,
                    label: "rust".to_string(),
                    title: title.to_string(),
                    html: "<p>hi</p>".to_string(),
                    public_show: true,
                },
                chrono::Utc::now(),
                u64::MAX,
            )
            .await
            .unwrap()
            .unwrap()
    }

    async fn hits(index: &MemoryIndex, query: &str) -> Vec<i64> {
        index
            .search(query, 1, 10)
            .await
            .unwrap()
            .list
            .into_iter()
            .map(|d| d.id)
            .collect()
    }

    #[tokio::test]
    async fn upsert_then_delete_converges_under_replay() {
        let f = fixture();
        let article = public_article(&f.articles, "Ownership in depth").await;
        let upsert = ArticleEvent::upsert(&article);

        f.worker.apply(upsert).await.unwrap();
        f.worker.apply(upsert).await.unwrap();
        assert_eq!(hits(&f.index, "Ownership in depth").await, vec![article.id]);

        let deleted = f.articles.mark_deleted(article.id).await.unwrap();
        let delete = ArticleEvent::delete(&deleted);
        f.worker.apply(delete).await.unwrap();
        // 迟到的重复 upsert 不会让文章重新出现
        f.worker.apply(upsert).await.unwrap();
        f.worker.apply(delete).await.unwrap();

        assert!(hits(&f.index, "Ownership in depth").await.is_empty());
    }

    #[tokio::test]
    async fn delete_delivered_before_upsert_still_wins() {
        let f = fixture();
        let article = public_article(&f.articles, "Lifetimes").await;
        let upsert = ArticleEvent::upsert(&article);
        let deleted = f.articles.mark_deleted(article.id).await.unwrap();

        f.worker.apply(ArticleEvent::delete(&deleted)).await.unwrap();
        f.worker.apply(upsert).await.unwrap();

        assert!(hits(&f.index, "Lifetimes").await.is_empty());
    }

    #[tokio::test]
    async fn update_replaces_indexed_title() {
        let f = fixture();
        let article = public_article(&f.articles, "Draft title").await;
        f.worker.apply(ArticleEvent::upsert(&article)).await.unwrap();

        let updated = f
            .articles
            .update(
                article.id,
                ArticleUpdate {
                    label: article.label_content.clone(),
                    title: "Final title".to_string(),
                    html: article.html.clone(),
                    public_show: true,
                },
            )
            .await
            .unwrap();
        f.worker.apply(ArticleEvent::upsert(&updated)).await.unwrap();

        assert!(hits(&f.index, "Draft").await.is_empty());
        assert_eq!(hits(&f.index, "Final title").await, vec![article.id]);
    }

    #[tokio::test]
    async fn upsert_of_missing_article_removes_it() {
        let f = fixture();
        f.index
            .upsert(ArticleDocument {
                id: 42,
                title: "orphan".to_string(),
                author: "x".to_string(),
                label_content: "y".to_string(),
                add_time: chrono::Utc::now(),
                version: 1,
            })
            .await
            .unwrap();

        f.worker
            .apply(ArticleEvent {
                kind: EventKind::Upsert,
                article_id: 42,
                updated_at: 2,
            })
            .await
            .unwrap();
        assert!(hits(&f.index, "orphan").await.is_empty());
    }

    #[tokio::test]
    async fn index_failure_propagates_for_redelivery() {
        let mut index = MockSearchIndex::new();
        index
            .expect_delete()
            .returning(|_, _| Err(AppError::Upstream("index down".into())));
        let worker = IndexSyncWorker::new(
            Arc::new(MemoryArticleStore::new()),
            Arc::new(index),
            Duration::from_secs(1),
        );

        let event = ArticleEvent {
            kind: EventKind::Delete,
            article_id: 1,
            updated_at: 1,
        };
        assert!(worker.apply(event).await.is_err());
    }

    #[tokio::test]
    async fn channel_worker_drains_published_events() {
        let f = fixture();
        let article = public_article(&f.articles, "Async traits").await;
        let (publisher, rx) = ChannelPublisher::new(8);

        publisher.publish(ArticleEvent::upsert(&article)).await.unwrap();
        drop(publisher);
        f.worker.clone().run_channel(rx).await;

        assert_eq!(hits(&f.index, "Async traits").await, vec![article.id]);
    }

    #[test]
    fn parses_stream_fields() {
        let map: HashMap<String, redis::Value> = [
            ("routing_key", "article.delete"),
            ("article_id", "12"),
            ("updated_at", "1700000000000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), redis::Value::BulkString(v.as_bytes().to_vec())))
        .collect();

        let event = parse_entry(&map).unwrap();
        assert_eq!(event.kind, EventKind::Delete);
        assert_eq!(event.article_id, 12);
        assert_eq!(event.updated_at, 1_700_000_000_000);
    }

    #[test]
    fn rejects_entry_without_routing_key() {
        let map = HashMap::from([(
            "article_id".to_string(),
            redis::Value::BulkString(b"1".to_vec()),
        )]);
        assert!(parse_entry(&map).is_err());
    }
}
