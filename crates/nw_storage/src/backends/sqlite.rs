use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nw_core::{
    sort_buckets, Article, ArticleFilter, ArticlePage, ArticleStats, ArticleStore, CountBucket, Error, FilterField,
    Pagination, Result, StoredArticle, UpsertSummary,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::StorageBackend;

const DEFAULT_DATABASE_URL: &str = "sqlite://articles.db";

const ORDER_BY: &str = " ORDER BY pub_date IS NULL, pub_date DESC, article_id ASC";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        article_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        link TEXT,
        description TEXT,
        content TEXT,
        keywords TEXT NOT NULL DEFAULT '[]',
        creator TEXT NOT NULL DEFAULT '[]',
        country TEXT NOT NULL DEFAULT '[]',
        category TEXT NOT NULL DEFAULT '[]',
        ai_tag TEXT NOT NULL DEFAULT '[]',
        ai_region TEXT NOT NULL DEFAULT '[]',
        ai_org TEXT NOT NULL DEFAULT '[]',
        pub_date TEXT,
        pub_date_tz TEXT,
        source_id TEXT,
        source_name TEXT,
        source_url TEXT,
        source_icon TEXT,
        source_priority INTEGER,
        language TEXT,
        sentiment TEXT,
        sentiment_stats TEXT,
        duplicate INTEGER NOT NULL DEFAULT 0,
        datatype TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles (pub_date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_articles_language ON articles (language)",
    "CREATE INDEX IF NOT EXISTS idx_articles_source_id ON articles (source_id)",
    // Add future migrations here
];

const UPSERT_ARTICLE: &str = r#"
    INSERT INTO articles (
        article_id, title, link, description, content,
        keywords, creator, country, category, ai_tag, ai_region, ai_org,
        pub_date, pub_date_tz,
        source_id, source_name, source_url, source_icon, source_priority,
        language, sentiment, sentiment_stats, duplicate, datatype,
        created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(article_id) DO UPDATE SET
        title = excluded.title,
        link = excluded.link,
        description = excluded.description,
        content = excluded.content,
        keywords = excluded.keywords,
        creator = excluded.creator,
        country = excluded.country,
        category = excluded.category,
        ai_tag = excluded.ai_tag,
        ai_region = excluded.ai_region,
        ai_org = excluded.ai_org,
        pub_date = excluded.pub_date,
        pub_date_tz = excluded.pub_date_tz,
        source_id = excluded.source_id,
        source_name = excluded.source_name,
        source_url = excluded.source_url,
        source_icon = excluded.source_icon,
        source_priority = excluded.source_priority,
        language = excluded.language,
        sentiment = excluded.sentiment,
        sentiment_stats = excluded.sentiment_stats,
        duplicate = excluded.duplicate,
        datatype = excluded.datatype,
        updated_at = excluded.updated_at
    "#;

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
    db_path: Option<PathBuf>,
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let mut storage = Self::connect_with(options).await?;
        storage.db_path = Some(db_path.to_path_buf());
        Ok(storage)
    }

    pub async fn new_with_url(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: None,
        })
    }

    pub fn get_db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    async fn find_with_search(&self, filter: &ArticleFilter, pagination: Pagination) -> Result<ArticlePage> {
        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM articles WHERE 1 = 1");
        push_filters(&mut select, filter);
        select.push(ORDER_BY);

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to find articles: {}", e)))?;

        let mut matched = Vec::new();
        for row in &rows {
            let stored = row_to_stored(row)?;
            if filter.matches(&stored.article) {
                matched.push(stored);
            }
        }

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(ArticlePage::new(items, total, pagination))
    }

    async fn buckets(&self, sql: &str) -> Result<Vec<CountBucket>> {
        let rows = sqlx::query(sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to aggregate articles: {}", e)))?;

        let mut buckets = rows
            .iter()
            .map(|row| {
                Ok(CountBucket {
                    name: row.try_get("name").map_err(decode_error)?,
                    count: row.try_get::<i64, _>("count").map_err(decode_error)? as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        sort_buckets(&mut buckets);
        Ok(buckets)
    }
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be available at ./articles.db"
    }

    async fn open(url: Option<&str>) -> Result<Self> {
        Self::new_with_url(url.unwrap_or(DEFAULT_DATABASE_URL)).await
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date {}: {}", raw, e)))
}

fn decode_error(e: sqlx::Error) -> Error {
    Error::Storage(format!("Failed to decode row: {}", e))
}

fn list_column(row: &SqliteRow, column: &str) -> Result<Vec<String>> {
    let raw: String = row.try_get(column).map_err(decode_error)?;
    Ok(serde_json::from_str(&raw)?)
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredArticle> {
    let text = |column: &str| -> Result<Option<String>> { row.try_get(column).map_err(decode_error) };

    let sentiment_stats = match text("sentiment_stats")? {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };

    let article = Article {
        article_id: row.try_get("article_id").map_err(decode_error)?,
        title: row.try_get("title").map_err(decode_error)?,
        link: text("link")?,
        description: text("description")?,
        content: text("content")?,
        keywords: list_column(row, "keywords")?,
        creator: list_column(row, "creator")?,
        country: list_column(row, "country")?,
        category: list_column(row, "category")?,
        ai_tag: list_column(row, "ai_tag")?,
        ai_region: list_column(row, "ai_region")?,
        ai_org: list_column(row, "ai_org")?,
        pub_date: text("pub_date")?.as_deref().map(parse_timestamp).transpose()?,
        pub_date_tz: text("pub_date_tz")?,
        source_id: text("source_id")?,
        source_name: text("source_name")?,
        source_url: text("source_url")?,
        source_icon: text("source_icon")?,
        source_priority: row.try_get("source_priority").map_err(decode_error)?,
        language: text("language")?,
        sentiment: text("sentiment")?,
        sentiment_stats,
        duplicate: row.try_get("duplicate").map_err(decode_error)?,
        datatype: text("datatype")?,
    };

    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(StoredArticle {
        article,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Returns `true` when the article was inserted, `false` when it replaced an
/// existing row.
async fn upsert_one(conn: &mut SqliteConnection, article: &Article, now: &str) -> Result<bool> {
    if article.article_id.trim().is_empty() {
        return Err(Error::StoreWrite("article_id is empty".to_string()));
    }

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE article_id = ?")
        .bind(&article.article_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::StoreWrite(format!("Failed to look up article: {}", e)))?;

    let sentiment_stats = article
        .sentiment_stats
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(UPSERT_ARTICLE)
        .bind(&article.article_id)
        .bind(&article.title)
        .bind(article.link.as_deref())
        .bind(article.description.as_deref())
        .bind(article.content.as_deref())
        .bind(serde_json::to_string(&article.keywords)?)
        .bind(serde_json::to_string(&article.creator)?)
        .bind(serde_json::to_string(&article.country)?)
        .bind(serde_json::to_string(&article.category)?)
        .bind(serde_json::to_string(&article.ai_tag)?)
        .bind(serde_json::to_string(&article.ai_region)?)
        .bind(serde_json::to_string(&article.ai_org)?)
        .bind(article.pub_date.map(format_timestamp))
        .bind(article.pub_date_tz.as_deref())
        .bind(article.source_id.as_deref())
        .bind(article.source_name.as_deref())
        .bind(article.source_url.as_deref())
        .bind(article.source_icon.as_deref())
        .bind(article.source_priority)
        .bind(article.language.as_deref())
        .bind(article.sentiment.as_deref())
        .bind(sentiment_stats)
        .bind(article.duplicate)
        .bind(article.datatype.as_deref())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::StoreWrite(format!("Failed to store article: {}", e)))?;

    Ok(existing == 0)
}

/// Pushes every constraint except `search`. SQLite's `lower()` only folds
/// ASCII, so the text search runs in Rust over the remaining rows.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ArticleFilter) {
    if let Some(category) = &filter.category {
        builder
            .push(" AND EXISTS (SELECT 1 FROM json_each(articles.category) WHERE json_each.value = ")
            .push_bind(category.clone())
            .push(")");
    }
    if let Some(country) = &filter.country {
        builder
            .push(" AND EXISTS (SELECT 1 FROM json_each(articles.country) WHERE json_each.value = ")
            .push_bind(country.clone())
            .push(")");
    }
    if let Some(language) = &filter.language {
        builder.push(" AND language = ").push_bind(language.clone());
    }
    if let Some(source_id) = &filter.source_id {
        builder.push(" AND source_id = ").push_bind(source_id.clone());
    }
    if let Some(sentiment) = &filter.sentiment {
        builder.push(" AND sentiment = ").push_bind(sentiment.clone());
    }
    if let Some(from) = filter.from {
        builder.push(" AND pub_date >= ").push_bind(format_timestamp(from));
    }
    if let Some(to) = filter.to {
        builder.push(" AND pub_date <= ").push_bind(format_timestamp(to));
    }
}

fn column_for(field: FilterField) -> &'static str {
    match field {
        FilterField::Category => "category",
        FilterField::Country => "country",
        FilterField::Language => "language",
        FilterField::SourceId => "source_id",
        FilterField::Sentiment => "sentiment",
        FilterField::Datatype => "datatype",
    }
}

#[async_trait]
impl ArticleStore for SQLiteStorage {
    async fn upsert_batch(&self, articles: &[Article]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        if articles.is_empty() {
            return Ok(summary);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::StoreWrite(format!("Failed to acquire connection: {}", e)))?;
        let now = format_timestamp(Utc::now());

        for article in articles {
            match upsert_one(&mut conn, article, &now).await {
                Ok(true) => summary.upserted += 1,
                Ok(false) => summary.modified += 1,
                Err(e) => {
                    warn!(article_id = %article.article_id, error = %e, "Failed to upsert article");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            upserted = summary.upserted,
            modified = summary.modified,
            failed = summary.failed,
            "Applied article batch"
        );
        Ok(summary)
    }

    async fn distinct_values(&self, field: FilterField) -> Result<Vec<String>> {
        let column = column_for(field);
        let sql = if field.is_list() {
            format!(
                "SELECT DISTINCT j.value FROM articles, json_each(articles.{column}) AS j \
                 WHERE j.value IS NOT NULL ORDER BY j.value"
            )
        } else {
            format!("SELECT DISTINCT {column} FROM articles WHERE {column} IS NOT NULL ORDER BY {column}")
        };

        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list distinct {}: {}", column, e)))
    }

    async fn find(&self, filter: &ArticleFilter, pagination: Pagination) -> Result<ArticlePage> {
        if filter.search.is_some() {
            return self.find_with_search(filter, pagination).await;
        }

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles WHERE 1 = 1");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to count articles: {}", e)))?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM articles WHERE 1 = 1");
        push_filters(&mut select, filter);
        select
            .push(ORDER_BY)
            .push(" LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(pagination.offset() as i64);

        let rows = select
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to find articles: {}", e)))?;

        let items = rows.iter().map(row_to_stored).collect::<Result<Vec<_>>>()?;
        Ok(ArticlePage::new(items, total as u64, pagination))
    }

    async fn get(&self, article_id: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE article_id = ?")
            .bind(article_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get article: {}", e)))?;

        row.as_ref().map(row_to_stored).transpose()
    }

    async fn stats(&self) -> Result<ArticleStats> {
        let total = self.count().await?;
        let by_category = self
            .buckets(
                "SELECT j.value AS name, COUNT(*) AS count \
                 FROM articles, json_each(articles.category) AS j GROUP BY j.value",
            )
            .await?;
        let by_country = self
            .buckets(
                "SELECT j.value AS name, COUNT(*) AS count \
                 FROM articles, json_each(articles.country) AS j GROUP BY j.value",
            )
            .await?;
        let by_language = self
            .buckets(
                "SELECT language AS name, COUNT(*) AS count \
                 FROM articles WHERE language IS NOT NULL GROUP BY language",
            )
            .await?;

        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(pub_date) FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read latest date: {}", e)))?;

        Ok(ArticleStats {
            total,
            by_category,
            by_language,
            by_country,
            latest_pub_date: latest.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    async fn count(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to count articles: {}", e)))?;
        Ok(total as u64)
    }
}
