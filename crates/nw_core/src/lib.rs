pub mod error;
pub mod storage;
pub mod types;
pub mod upstream;

pub use error::{Error, Result};
pub use storage::ArticleStore;
pub use types::{
    Article, ArticleFilter, ArticlePage, ArticleStats, CountBucket, FilterField, Pagination, RawArticle,
    RunTotals, StoredArticle, UpsertSummary,
};
pub use types::sort_buckets;
pub use upstream::{CategoryBatch, NewsPage, NewsSource, MAX_CATEGORIES_PER_BATCH};
