use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::types::RawArticle;
use crate::{Error, Result};

/// The provider accepts at most this many categories per request.
pub const MAX_CATEGORIES_PER_BATCH: usize = 5;

/// Status string the provider uses for a successful page.
pub const SUCCESS_STATUS: &str = "success";

/// An ordered group of categories sent together in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryBatch(Vec<String>);

impl CategoryBatch {
    /// Splits `categories` into consecutive batches of at most
    /// [`MAX_CATEGORIES_PER_BATCH`], preserving order.
    pub fn chunk(categories: &[String]) -> Vec<CategoryBatch> {
        categories
            .chunks(MAX_CATEGORIES_PER_BATCH)
            .map(|chunk| CategoryBatch(chunk.to_vec()))
            .collect()
    }

    pub fn categories(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined form used as the `category` query parameter.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl fmt::Display for CategoryBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// One page of provider output.
#[derive(Debug, Clone)]
pub struct NewsPage {
    pub status: String,
    pub results: Vec<RawArticle>,
    pub next_page: Option<String>,
    /// Full response body, retained only for non-success pages.
    pub payload: Option<Value>,
}

impl NewsPage {
    pub fn success(results: Vec<RawArticle>, next_page: Option<String>) -> Self {
        Self {
            status: SUCCESS_STATUS.to_string(),
            results,
            next_page,
            payload: None,
        }
    }

    /// Decodes a response body. Records that fail to decode are skipped.
    pub fn from_payload(payload: Value) -> Self {
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        if status != SUCCESS_STATUS {
            return Self {
                status,
                results: Vec::new(),
                next_page: None,
                payload: Some(payload),
            };
        }

        let results = payload
            .get("results")
            .and_then(Value::as_array)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| match serde_json::from_value::<RawArticle>(record.clone()) {
                        Ok(raw) => Some(raw),
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable upstream record");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next_page = match payload.get("nextPage") {
            Some(Value::String(token)) if !token.is_empty() => Some(token.clone()),
            Some(Value::Number(token)) => Some(token.to_string()),
            _ => None,
        };

        Self::success(results, next_page)
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    /// Splits a successful page into its records and continuation token, or
    /// reports the provider payload as [`Error::UpstreamData`].
    pub fn check(self) -> Result<(Vec<RawArticle>, Option<String>)> {
        if self.is_success() {
            Ok((self.results, self.next_page))
        } else {
            let payload = self
                .payload
                .unwrap_or_else(|| serde_json::json!({ "status": self.status }));
            Err(Error::UpstreamData { payload })
        }
    }
}

/// A paged news provider.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Whether a credential is available. Runs are skipped when it is not.
    fn is_configured(&self) -> bool;

    /// Fetches one page for `batch`. Transport and HTTP failures are errors;
    /// a non-success status reported in the body is returned as a page.
    async fn fetch_page(
        &self,
        batch: &CategoryBatch,
        language: &str,
        page_token: Option<&str>,
    ) -> Result<NewsPage>;
}
