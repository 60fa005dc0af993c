use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nw_core::{
    sort_buckets, Article, ArticleFilter, ArticlePage, ArticleStats, ArticleStore, CountBucket, FilterField,
    Pagination, Result, StoredArticle, UpsertSummary,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::StorageBackend;

/// Whether an upsert created a new document or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Default)]
pub struct MemoryStore {
    articles: HashMap<String, StoredArticle>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&mut self, article: &Article, now: DateTime<Utc>) -> std::result::Result<UpsertOutcome, String> {
        if article.article_id.trim().is_empty() {
            return Err("article_id is empty".to_string());
        }

        if let Some(existing) = self.articles.get_mut(&article.article_id) {
            existing.article = article.clone();
            existing.updated_at = now;
            Ok(UpsertOutcome::Replaced)
        } else {
            self.articles.insert(
                article.article_id.clone(),
                StoredArticle {
                    article: article.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(UpsertOutcome::Inserted)
        }
    }

    pub fn upsert_batch(&mut self, articles: &[Article]) -> UpsertSummary {
        let now = Utc::now();
        let mut summary = UpsertSummary::default();
        for article in articles {
            match self.upsert(article, now) {
                Ok(UpsertOutcome::Inserted) => summary.upserted += 1,
                Ok(UpsertOutcome::Replaced) => summary.modified += 1,
                Err(reason) => {
                    warn!(article_id = %article.article_id, %reason, "Rejected article during upsert");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub fn find(&self, filter: &ArticleFilter, pagination: Pagination) -> ArticlePage {
        let mut matching: Vec<&StoredArticle> = self
            .articles
            .values()
            .filter(|stored| filter.matches(&stored.article))
            .collect();

        // Newest first, undated last.
        matching.sort_by(|a, b| match (a.article.pub_date, b.article.pub_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.article.article_id.cmp(&b.article.article_id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        ArticlePage::new(items, total, pagination)
    }

    pub fn distinct_values(&self, field: FilterField) -> Vec<String> {
        self.articles
            .values()
            .flat_map(|stored| field.values(&stored.article))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn buckets(&self, field: FilterField) -> Vec<CountBucket> {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for stored in self.articles.values() {
            for value in field.values(&stored.article) {
                *counts.entry(value).or_default() += 1;
            }
        }
        let mut buckets: Vec<CountBucket> = counts
            .into_iter()
            .map(|(name, count)| CountBucket {
                name: name.to_string(),
                count,
            })
            .collect();
        sort_buckets(&mut buckets);
        buckets
    }

    pub fn stats(&self) -> ArticleStats {
        ArticleStats {
            total: self.articles.len() as u64,
            by_category: self.buckets(FilterField::Category),
            by_language: self.buckets(FilterField::Language),
            by_country: self.buckets(FilterField::Country),
            latest_pub_date: self.articles.values().filter_map(|s| s.article.pub_date).max(),
        }
    }

    pub fn get(&self, article_id: &str) -> Option<StoredArticle> {
        self.articles.get(article_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn open(_url: Option<&str>) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStore for InMemoryStorage {
    async fn upsert_batch(&self, articles: &[Article]) -> Result<UpsertSummary> {
        if articles.is_empty() {
            return Ok(UpsertSummary::default());
        }
        let mut store = self.store.write().await;
        Ok(store.upsert_batch(articles))
    }

    async fn distinct_values(&self, field: FilterField) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(store.distinct_values(field))
    }

    async fn find(&self, filter: &ArticleFilter, pagination: Pagination) -> Result<ArticlePage> {
        let store = self.store.read().await;
        Ok(store.find(filter, pagination))
    }

    async fn get(&self, article_id: &str) -> Result<Option<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.get(article_id))
    }

    async fn stats(&self) -> Result<ArticleStats> {
        let store = self.store.read().await;
        Ok(store.stats())
    }

    async fn count(&self) -> Result<u64> {
        let store = self.store.read().await;
        Ok(store.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn article(id: &str, title: &str, category: &[&str], day: Option<u32>) -> Article {
        let mut article = Article::new(id, title);
        article.category = category.iter().map(|c| c.to_string()).collect();
        article.language = Some("english".to_string());
        article.pub_date = day.map(|d| Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap());
        article
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let storage = InMemoryStorage::new();
        let mut first = article("a1", "First title", &["technology", "science"], Some(1));
        first.link = Some("https://example.com/a1".to_string());
        first.sentiment_stats = Some(json!({ "positive": 0.7 }));

        let summary = storage.upsert_batch(&[first.clone()]).await.unwrap();
        assert_eq!(summary, UpsertSummary { upserted: 1, modified: 0, failed: 0 });
        let created = storage.get("a1").await.unwrap().unwrap();

        let mut second = article("a1", "Second title", &["business"], Some(2));
        second.link = None;
        let summary = storage.upsert_batch(&[second.clone()]).await.unwrap();
        assert_eq!(summary, UpsertSummary { upserted: 0, modified: 1, failed: 0 });

        let stored = storage.get("a1").await.unwrap().unwrap();
        assert_eq!(stored.article, second);
        assert_eq!(stored.article.category, vec!["business"]);
        assert!(stored.article.link.is_none());
        assert!(stored.article.sentiment_stats.is_none());
        assert_eq!(stored.created_at, created.created_at);
        assert!(stored.updated_at >= created.updated_at);
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_record_does_not_block_batch() {
        let storage = InMemoryStorage::new();
        let batch = vec![
            article("a1", "One", &[], None),
            article("  ", "No identity", &[], None),
            article("a2", "Two", &[], None),
        ];
        let summary = storage.upsert_batch(&batch).await.unwrap();
        assert_eq!(summary, UpsertSummary { upserted: 2, modified: 0, failed: 1 });
        assert_eq!(storage.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let storage = InMemoryStorage::new();
        let summary = storage.upsert_batch(&[]).await.unwrap();
        assert_eq!(summary, UpsertSummary::default());
    }

    #[tokio::test]
    async fn test_find_orders_and_paginates() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_batch(&[
                article("old", "Old news", &["technology"], Some(1)),
                article("undated", "Undated", &["technology"], None),
                article("new", "New news", &["technology"], Some(9)),
                article("mid", "Middle", &["sports"], Some(5)),
            ])
            .await
            .unwrap();

        let page = storage.find(&ArticleFilter::default(), Pagination::new(Some(1), Some(3))).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|s| s.article.article_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);

        let page = storage.find(&ArticleFilter::default(), Pagination::new(Some(2), Some(3))).await.unwrap();
        assert_eq!(page.items[0].article.article_id, "undated");

        let filter = ArticleFilter {
            category: Some("technology".to_string()),
            search: Some("news".to_string()),
            ..Default::default()
        };
        let page = storage.find(&filter, Pagination::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_distinct_values_and_stats() {
        let storage = InMemoryStorage::new();
        let mut spanish = article("b", "Hola", &["sports"], Some(3));
        spanish.language = Some("spanish".to_string());
        spanish.country = vec!["spain".to_string()];
        storage
            .upsert_batch(&[article("a", "Hello", &["technology", "sports"], Some(2)), spanish])
            .await
            .unwrap();

        assert_eq!(
            storage.distinct_values(FilterField::Category).await.unwrap(),
            vec!["sports", "technology"]
        );
        assert_eq!(
            storage.distinct_values(FilterField::Language).await.unwrap(),
            vec!["english", "spanish"]
        );
        assert!(storage.distinct_values(FilterField::Sentiment).await.unwrap().is_empty());

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category[0], CountBucket { name: "sports".to_string(), count: 2 });
        assert_eq!(stats.by_country.len(), 1);
        assert_eq!(stats.latest_pub_date, Some(Utc.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap()));
    }
}
