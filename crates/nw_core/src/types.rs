use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Canonical article as persisted by every store backend.
///
/// Optional scalars serialize as explicit `null` so that a re-ingested record
/// clears values the provider no longer reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub article_id: String,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub creator: Vec<String>,
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub ai_tag: Vec<String>,
    #[serde(default)]
    pub ai_region: Vec<String>,
    #[serde(default)]
    pub ai_org: Vec<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(rename = "pubDateTZ")]
    pub pub_date_tz: Option<String>,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub source_icon: Option<String>,
    pub source_priority: Option<i64>,
    pub language: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_stats: Option<Value>,
    #[serde(default)]
    pub duplicate: bool,
    pub datatype: Option<String>,
}

impl Article {
    /// An article with only its identity and title set.
    pub fn new(article_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            article_id: article_id.into(),
            title: title.into(),
            link: None,
            description: None,
            content: None,
            keywords: Vec::new(),
            creator: Vec::new(),
            country: Vec::new(),
            category: Vec::new(),
            ai_tag: Vec::new(),
            ai_region: Vec::new(),
            ai_org: Vec::new(),
            pub_date: None,
            pub_date_tz: None,
            source_id: None,
            source_name: None,
            source_url: None,
            source_icon: None,
            source_priority: None,
            language: None,
            sentiment: None,
            sentiment_stats: None,
            duplicate: false,
            datatype: None,
        }
    }
}

/// An article together with the bookkeeping timestamps the store maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    #[serde(flatten)]
    pub article: Article,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record exactly as the news provider returns it.
///
/// Every field is optional; list fields tolerate `null`, a bare string or an
/// array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
    pub article_id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub creator: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub country: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub category: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub ai_tag: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub ai_region: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub ai_org: Vec<String>,
    #[serde(rename = "pubDate", default, deserialize_with = "lenient_string")]
    pub pub_date: Option<String>,
    #[serde(rename = "pubDateTZ", default, deserialize_with = "lenient_string")]
    pub pub_date_tz: Option<String>,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub source_icon: Option<String>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub source_priority: Option<i64>,
    pub language: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_stats: Option<Value>,
    pub duplicate: Option<bool>,
    pub datatype: Option<String>,
}

/// Keeps strings; any other JSON type decodes as `None`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        _ => None,
    })
}

/// Accepts integers, floats (rounded) and numeric strings.
fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64),
        _ => None,
    })
}

fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Option<String>>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values.into_iter().flatten().collect(),
    })
}

/// Result of one `upsert_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Keys that did not exist before and were inserted.
    pub upserted: u64,
    /// Existing keys whose fields were replaced.
    pub modified: u64,
    /// Records rejected individually; not reflected in the other counts.
    pub failed: u64,
}

/// Aggregate counts of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub pages: u64,
    pub upserted: u64,
    pub modified: u64,
}

impl RunTotals {
    pub fn record_page(&mut self, summary: &UpsertSummary) {
        self.pages += 1;
        self.upserted += summary.upserted;
        self.modified += summary.modified;
    }
}

/// Optional constraints for listing articles. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub source_id: Option<String>,
    pub sentiment: Option<String>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ArticleFilter {
    pub fn matches(&self, article: &Article) -> bool {
        fn contains(list: &[String], wanted: &Option<String>) -> bool {
            wanted.as_ref().map_or(true, |w| list.iter().any(|v| v == w))
        }
        fn equals(value: &Option<String>, wanted: &Option<String>) -> bool {
            wanted.as_ref().map_or(true, |w| value.as_deref() == Some(w.as_str()))
        }

        if !contains(&article.category, &self.category) || !contains(&article.country, &self.country) {
            return false;
        }
        if !equals(&article.language, &self.language)
            || !equals(&article.source_id, &self.source_id)
            || !equals(&article.sentiment, &self.sentiment)
        {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = article.title.to_lowercase().contains(&needle);
            let in_description = article
                .description
                .as_ref()
                .map_or(false, |d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(published) = article.pub_date else {
                return false;
            };
            if self.from.map_or(false, |from| published < from) || self.to.map_or(false, |to| published > to) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlePage {
    pub items: Vec<StoredArticle>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl ArticlePage {
    pub fn new(items: Vec<StoredArticle>, total: u64, pagination: Pagination) -> Self {
        let limit = u64::from(pagination.limit);
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Fields that support a distinct-values query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Category,
    Country,
    Language,
    SourceId,
    Sentiment,
    Datatype,
}

impl FilterField {
    pub const ALL: [FilterField; 6] = [
        FilterField::Category,
        FilterField::Country,
        FilterField::Language,
        FilterField::SourceId,
        FilterField::Sentiment,
        FilterField::Datatype,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Category => "category",
            FilterField::Country => "country",
            FilterField::Language => "language",
            FilterField::SourceId => "source_id",
            FilterField::Sentiment => "sentiment",
            FilterField::Datatype => "datatype",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FilterField::Category | FilterField::Country)
    }

    /// Values of this field carried by one article.
    pub fn values<'a>(&self, article: &'a Article) -> Vec<&'a str> {
        let scalar = |value: &'a Option<String>| -> Vec<&'a str> { value.as_deref().into_iter().collect() };
        match self {
            FilterField::Category => article.category.iter().map(String::as_str).collect(),
            FilterField::Country => article.country.iter().map(String::as_str).collect(),
            FilterField::Language => scalar(&article.language),
            FilterField::SourceId => scalar(&article.source_id),
            FilterField::Sentiment => scalar(&article.sentiment),
            FilterField::Datatype => scalar(&article.datatype),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountBucket {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleStats {
    pub total: u64,
    pub by_category: Vec<CountBucket>,
    pub by_language: Vec<CountBucket>,
    pub by_country: Vec<CountBucket>,
    pub latest_pub_date: Option<DateTime<Utc>>,
}

/// Orders buckets by count descending, then by name.
pub fn sort_buckets(buckets: &mut [CountBucket]) {
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
}
