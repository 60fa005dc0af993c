use nw_core::{Result, RunTotals};
use std::fmt;
use tracing::{error, info, warn};

use crate::guard::RunGuard;
use crate::orchestrator::Ingestor;

/// What started an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Scheduled,
    Startup,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::Startup => "startup",
        })
    }
}

/// Entry point shared by the HTTP trigger, the scheduler and the startup run.
/// All of them go through the same [`RunGuard`].
pub struct IngestionRunner {
    ingestor: Ingestor,
    guard: RunGuard,
}

impl IngestionRunner {
    pub fn new(ingestor: Ingestor, guard: RunGuard) -> Self {
        Self { ingestor, guard }
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Runs now, or fails with `AlreadyRunning` if another run holds the guard.
    pub async fn trigger_manual_ingestion(&self) -> Result<RunTotals> {
        let permit = self.guard.try_acquire().map_err(|e| {
            warn!(trigger = %Trigger::Manual, "Ingestion already in progress; rejecting trigger");
            e
        })?;

        info!(trigger = %Trigger::Manual, "Ingestion triggered");
        let result = self.ingestor.run().await;
        permit.release();
        result
    }

    /// Entry point for cron firings.
    pub async fn run_scheduled(&self) -> Option<RunTotals> {
        self.run_unattended(Trigger::Scheduled).await
    }

    /// Unattended run. Overlaps are skipped and failures are logged, never
    /// returned.
    pub async fn run_unattended(&self, trigger: Trigger) -> Option<RunTotals> {
        let permit = match self.guard.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%trigger, "Previous ingestion run still in progress; skipping");
                return None;
            }
        };

        info!(%trigger, "Ingestion triggered");
        let result = self.ingestor.run().await;
        permit.release();

        match result {
            Ok(totals) => Some(totals),
            Err(e) => {
                error!(%trigger, error = %e, "Ingestion run failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{page, Scripted, ScriptedSource};
    use async_trait::async_trait;
    use nw_core::{CategoryBatch, Error, NewsPage, NewsSource};
    use nw_storage::InMemoryStorage;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Blocks inside `fetch_page` until released.
    struct BlockingSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl NewsSource for BlockingSource {
        fn is_configured(&self) -> bool {
            true
        }

        async fn fetch_page(&self, _: &CategoryBatch, _: &str, _: Option<&str>) -> Result<NewsPage> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(NewsPage::success(Vec::new(), None))
        }
    }

    fn runner(source: Arc<dyn NewsSource>) -> IngestionRunner {
        let store = Arc::new(InMemoryStorage::new());
        let ingestor = Ingestor::new(source, store, vec!["top".to_string()], "en");
        IngestionRunner::new(ingestor, RunGuard::new())
    }

    #[tokio::test]
    async fn test_manual_trigger_rejected_while_running() {
        let source = Arc::new(BlockingSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let runner = Arc::new(runner(source.clone()));

        let first = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.trigger_manual_ingestion().await }
        });
        source.entered.notified().await;

        assert!(runner.is_running());
        let second = runner.trigger_manual_ingestion().await;
        assert!(matches!(second, Err(Error::AlreadyRunning)));
        assert_eq!(runner.run_scheduled().await, None);

        source.release.notify_one();
        let totals = first.await.unwrap().unwrap();
        assert_eq!(totals.pages, 1);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let source = Arc::new(ScriptedSource::default().script("top", None, Scripted::Transport(500)));
        let runner = runner(source);

        let err = runner.trigger_manual_ingestion().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamTransport { .. }));
        assert!(!runner.is_running());

        assert_eq!(runner.run_unattended(Trigger::Scheduled).await, None);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_unattended_run_returns_totals() {
        let source = Arc::new(ScriptedSource::default().script("top", None, page(&["a"], None)));
        let runner = runner(source);

        let totals = runner.run_unattended(Trigger::Startup).await.unwrap();
        assert_eq!(totals, RunTotals { pages: 1, upserted: 1, modified: 0 });
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Manual.to_string(), "manual");
        assert_eq!(Trigger::Scheduled.to_string(), "scheduled");
        assert_eq!(Trigger::Startup.to_string(), "startup");
    }
}
