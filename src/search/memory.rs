use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ArticleDocument, SearchIndex};
use crate::database::Page;
use crate::error::AppResult;

struct Slot {
    version: i64,
    /// None 表示已删除（墓碑），保留版本号以拒绝更旧的写入
    doc: Option<ArticleDocument>,
}

/// 进程内搜索索引
#[derive(Default)]
pub struct MemoryIndex {
    slots: RwLock<HashMap<i64, Slot>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    async fn apply(&self, id: i64, version: i64, doc: Option<ArticleDocument>) -> bool {
        let mut slots = self.slots.write().await;
        match slots.get(&id) {
            Some(slot) if slot.version >= version => false,
            _ => {
                slots.insert(id, Slot { version, doc });
                true
            }
        }
    }
}

fn matches(doc: &ArticleDocument, needle: &str) -> bool {
    needle.is_empty()
        || [&doc.title, &doc.author, &doc.label_content]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert(&self, doc: ArticleDocument) -> AppResult<()> {
        let (id, version) = (doc.id, doc.version);
        if !self.apply(id, version, Some(doc)).await {
            tracing::debug!("Skip stale upsert for article {} at {}", id, version);
        }
        Ok(())
    }

    async fn delete(&self, id: i64, version: i64) -> AppResult<()> {
        if !self.apply(id, version, None).await {
            tracing::debug!("Skip stale delete for article {} at {}", id, version);
        }
        Ok(())
    }

    async fn search(&self, query: &str, page: u64, size: u64) -> AppResult<Page<ArticleDocument>> {
        let needle = query.trim().to_lowercase();
        let slots = self.slots.read().await;

        let mut hits: Vec<&ArticleDocument> = slots
            .values()
            .filter_map(|slot| slot.doc.as_ref())
            .filter(|doc| matches(doc, &needle))
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
