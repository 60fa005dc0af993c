use async_trait::async_trait;
use nw_core::{CategoryBatch, Error, NewsPage, NewsSource, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::IngestSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOGGED_BODY: usize = 512;

/// HTTP client for the newsdata.io `news` endpoint.
#[derive(Clone)]
pub struct NewsDataClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NewsDataClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("newswire/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_settings(settings: &IngestSettings) -> Result<Self> {
        Self::new(settings.base_url.clone(), settings.api_key.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/news", self.base_url)
    }
}

#[async_trait]
impl NewsSource for NewsDataClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(level = "debug", skip(self), fields(batch = %batch))]
    async fn fetch_page(
        &self,
        batch: &CategoryBatch,
        language: &str,
        page_token: Option<&str>,
    ) -> Result<NewsPage> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(Error::ConfigMissing("NEWSDATA_API_KEY"))?;

        let mut query = vec![
            ("apikey", api_key.to_string()),
            ("language", language.to_string()),
            ("category", batch.joined()),
        ];
        if let Some(token) = page_token {
            query.push(("page", token.to_string()));
        }

        let response = self.client.get(self.endpoint()).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .ok()
                .map(|text| truncate_for_log(&text, MAX_LOGGED_BODY));
            return Err(Error::UpstreamTransport {
                status: Some(status.as_u16()),
                body,
                message: format!("News API responded with HTTP {}", status),
            });
        }

        let payload: Value = response.json().await?;
        let page = NewsPage::from_payload(payload);
        debug!(
            status = %page.status,
            results = page.results.len(),
            has_next = page.next_page.is_some(),
            "Fetched news page"
        );
        Ok(page)
    }
}

fn truncate_for_log(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
