use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ArticleDocument, SearchIndex};
use crate::database::Page;
use crate::error::{AppError, AppResult};

const SEARCH_FIELDS: [&str; 3] = ["title", "author", "label_content"];

/// Elasticsearch 兼容的搜索索引
///
/// 写入使用外部版本号（version_type=external），版本不大于已有版本时
/// 服务端返回 409，此时说明索引里已经是更新的状态，直接忽略。
pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: Total,
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Total {
    value: u64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: ArticleDocument,
}

impl ElasticIndex {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn doc_url(&self, id: i64, version: i64) -> String {
        format!(
            "{}/{}/_doc/{}?version={}&version_type=external",
            self.base_url, self.index, id, version
        )
    }
}

/// 构造查询体，page 从 1 开始
fn search_body(query: &str, page: u64, size: u64) -> Value {
    let query = query.trim();
    let clause = if query.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "multi_match": { "query": query, "fields": SEARCH_FIELDS } })
    };

    json!({
        "query": clause,
        "from": page.saturating_sub(1) * size,
        "size": size,
        "track_total_hits": true,
    })
}

fn check_write(status: StatusCode, id: i64, op: &str) -> AppResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::CONFLICT => {
            tracing::debug!("Skip stale {} for article {}", op, id);
            Ok(())
        }
        StatusCode::NOT_FOUND if op == "delete" => Ok(()),
        s => Err(AppError::Upstream(format!(
            "search index {} for article {} returned {}",
            op, id, s
        ))),
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn upsert(&self, doc: ArticleDocument) -> AppResult<()> {
        let response = self
            .client
            .put(self.doc_url(doc.id, doc.version))
            .json(&doc)
            .send()
            .await?;
        check_write(response.status(), doc.id, "upsert")
    }

    async fn delete(&self, id: i64, version: i64) -> AppResult<()> {
        let response = self.client.delete(self.doc_url(id, version)).send().await?;
        check_write(response.status(), id, "delete")
    }

    async fn search(&self, query: &str, page: u64, size: u64) -> AppResult<Page<ArticleDocument>> {
        let response: SearchResponse = self
            .client
            .post(format!("{}/{}/_search", self.base_url, self.index))
            .json(&search_body(query, page, size))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let list = response.hits.hits.into_iter().map(|h| h.source).collect();
        Ok(Page::new(response.hits.total.value, size, list))
    }
}
