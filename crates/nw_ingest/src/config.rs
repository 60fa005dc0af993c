use nw_core::{CategoryBatch, Error, Result};
use std::fmt;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://newsdata.io/api/1";
pub const DEFAULT_CATEGORIES: &str = "top";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_SCHEDULE: &str = "*/30 * * * *";

/// Everything the ingestion pipeline reads from configuration.
#[derive(Clone)]
pub struct IngestSettings {
    /// Provider credential. Runs are skipped while this is unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub categories: Vec<String>,
    pub language: String,
    /// Cron expression, five fields or six with seconds.
    pub schedule: String,
    pub run_on_startup: bool,
}

impl IngestSettings {
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        categories: &str,
        language: Option<&str>,
        schedule: &str,
        run_on_startup: bool,
    ) -> Result<Self> {
        Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            categories: parse_categories(categories),
            language: language
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(DEFAULT_LANGUAGE)
                .to_string(),
            schedule: schedule.trim().to_string(),
            run_on_startup,
        })
    }

    pub fn batches(&self) -> Vec<CategoryBatch> {
        CategoryBatch::chunk(&self.categories)
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            categories: parse_categories(DEFAULT_CATEGORIES),
            language: DEFAULT_LANGUAGE.to_string(),
            schedule: DEFAULT_SCHEDULE.to_string(),
            run_on_startup: false,
        }
    }
}

impl fmt::Debug for IngestSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("categories", &self.categories)
            .field("language", &self.language)
            .field("schedule", &self.schedule)
            .field("run_on_startup", &self.run_on_startup)
            .finish()
    }
}

/// Splits a comma-separated category list, trimming entries and dropping
/// empty ones.
pub fn parse_categories(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
