use async_trait::async_trait;

use crate::types::{
    Article, ArticleFilter, ArticlePage, ArticleStats, FilterField, Pagination, StoredArticle, UpsertSummary,
};
use crate::Result;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Upserts every article keyed by `article_id`.
    ///
    /// Each record is applied independently: a rejected record is counted in
    /// `failed` and does not stop the rest. An empty slice never touches the
    /// backend.
    async fn upsert_batch(&self, articles: &[Article]) -> Result<UpsertSummary>;

    /// Distinct values of `field` across all articles, sorted ascending.
    async fn distinct_values(&self, field: FilterField) -> Result<Vec<String>>;

    /// Articles matching `filter`, newest first.
    async fn find(&self, filter: &ArticleFilter, pagination: Pagination) -> Result<ArticlePage>;

    /// A single article by its identity key.
    async fn get(&self, article_id: &str) -> Result<Option<StoredArticle>>;

    async fn stats(&self) -> Result<ArticleStats>;

    async fn count(&self) -> Result<u64>;
}
