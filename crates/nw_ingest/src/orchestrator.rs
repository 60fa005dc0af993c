use nw_core::{Article, ArticleStore, CategoryBatch, Error, NewsSource, Result, RunTotals};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::normalize::normalize;

/// Pages fetched per category batch before moving on.
pub const MAX_PAGES_PER_BATCH: u32 = 3;
/// Pause between consecutive pages of the same batch.
pub const PAGE_DELAY: Duration = Duration::from_millis(1000);
/// Pause between batches.
pub const BATCH_DELAY: Duration = Duration::from_millis(1500);

/// Drives one full ingestion run: batches, pages, normalization, upserts.
pub struct Ingestor {
    source: Arc<dyn NewsSource>,
    store: Arc<dyn ArticleStore>,
    categories: Vec<String>,
    language: String,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn NewsSource>,
        store: Arc<dyn ArticleStore>,
        categories: Vec<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            categories,
            language: language.into(),
        }
    }

    pub fn batches(&self) -> Vec<CategoryBatch> {
        CategoryBatch::chunk(&self.categories)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn store(&self) -> Arc<dyn ArticleStore> {
        Arc::clone(&self.store)
    }

    /// Runs every batch in order.
    ///
    /// A non-success payload ends only the current batch. Transport and store
    /// failures abort the whole run and the partial totals are dropped.
    pub async fn run(&self) -> Result<RunTotals> {
        if !self.source.is_configured() {
            warn!("News API key is not configured; skipping ingestion run");
            return Ok(RunTotals::default());
        }

        let batches = self.batches();
        if batches.is_empty() {
            warn!("No categories configured; nothing to ingest");
            return Ok(RunTotals::default());
        }

        info!(
            batches = batches.len(),
            language = %self.language,
            "🗞️ Starting ingestion run"
        );
        let started = Instant::now();
        let mut totals = RunTotals::default();

        for (index, batch) in batches.iter().enumerate() {
            self.ingest_batch(batch, &mut totals).await?;
            if index + 1 < batches.len() {
                sleep(BATCH_DELAY).await;
            }
        }

        info!(
            pages = totals.pages,
            upserted = totals.upserted,
            modified = totals.modified,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "✅ Ingestion run completed"
        );
        Ok(totals)
    }

    async fn ingest_batch(&self, batch: &CategoryBatch, totals: &mut RunTotals) -> Result<()> {
        let mut page_token: Option<String> = None;
        let mut pages_fetched = 0u32;

        loop {
            let page = self
                .source
                .fetch_page(batch, &self.language, page_token.as_deref())
                .await
                .map_err(|e| log_run_failure(batch, pages_fetched + 1, e))?;

            let (records, next_page) = match page.check() {
                Ok(parts) => parts,
                Err(Error::UpstreamData { payload }) => {
                    warn!(
                        batch = %batch,
                        page = pages_fetched + 1,
                        %payload,
                        "News API returned a non-success status; skipping the rest of this batch"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let articles: Vec<Article> = records.into_iter().map(normalize).collect();
            let summary = self
                .store
                .upsert_batch(&articles)
                .await
                .map_err(|e| log_run_failure(batch, pages_fetched + 1, e))?;
            totals.record_page(&summary);
            pages_fetched += 1;

            if summary.failed > 0 {
                warn!(batch = %batch, failed = summary.failed, "Some articles were rejected by the store");
            }
            debug!(
                batch = %batch,
                page = pages_fetched,
                fetched = articles.len(),
                upserted = summary.upserted,
                modified = summary.modified,
                "Stored news page"
            );

            page_token = next_page;
            if page_token.is_none() || pages_fetched >= MAX_PAGES_PER_BATCH {
                return Ok(());
            }
            sleep(PAGE_DELAY).await;
        }
    }
}

fn log_run_failure(batch: &CategoryBatch, page: u32, err: Error) -> Error {
    match &err {
        Error::UpstreamTransport { status, body, message } => error!(
            batch = %batch,
            page,
            status = ?status,
            body = body.as_deref().unwrap_or(""),
            %message,
            "News API request failed; aborting ingestion run"
        ),
        other => error!(batch = %batch, page, error = %other, "Ingestion run aborted"),
    }
    err
}
