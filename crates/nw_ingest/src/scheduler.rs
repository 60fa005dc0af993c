use nw_core::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info};

use crate::config::DEFAULT_SCHEDULE;
use crate::runner::{IngestionRunner, Trigger};

/// Adds a leading seconds field to standard five-field cron expressions.
pub fn normalize_schedule(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Checks that `expression` is a usable schedule and returns its normalized form.
pub fn validate_schedule(expression: &str) -> Result<String> {
    let normalized = normalize_schedule(expression);
    Job::new_async(normalized.as_str(), |_uuid, _scheduler| Box::pin(async {}))
        .map_err(|e| invalid_schedule(expression, e))?;
    Ok(normalized)
}

fn invalid_schedule(expression: &str, err: JobSchedulerError) -> Error {
    Error::ScheduleInvalid {
        expression: expression.to_string(),
        reason: err.to_string(),
    }
}

fn scheduler_error(err: JobSchedulerError) -> Error {
    Error::Scheduler(err.to_string())
}

fn ingestion_job(runner: Arc<IngestionRunner>, expression: &str) -> Result<Job> {
    let normalized = normalize_schedule(expression);
    Job::new_async(normalized.as_str(), move |_uuid, _scheduler| {
        let runner = Arc::clone(&runner);
        Box::pin(async move {
            runner.run_scheduled().await;
        })
    })
    .map_err(|e| invalid_schedule(expression, e))
}

/// Registers the recurring ingestion job and starts the scheduler.
///
/// An invalid expression is logged and leaves scheduling (and the startup run)
/// disabled; it returns `Ok(None)` rather than failing the process.
pub async fn start_scheduler(
    runner: Arc<IngestionRunner>,
    expression: &str,
    run_on_startup: bool,
) -> Result<Option<JobScheduler>> {
    let job = match ingestion_job(Arc::clone(&runner), expression) {
        Ok(job) => job,
        Err(e) => {
            error!(
                error = %e,
                default = DEFAULT_SCHEDULE,
                "Invalid ingestion schedule; scheduled ingestion disabled"
            );
            return Ok(None);
        }
    };

    let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
    scheduler.add(job).await.map_err(scheduler_error)?;
    scheduler.start().await.map_err(scheduler_error)?;
    info!(schedule = expression, "⏰ Ingestion scheduler started");

    if run_on_startup {
        spawn_startup_run(runner);
    }

    Ok(Some(scheduler))
}

/// Fires one run in the background without delaying the caller.
pub fn spawn_startup_run(runner: Arc<IngestionRunner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        runner.run_unattended(Trigger::Startup).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::RunGuard;
    use crate::orchestrator::tests::{page, ScriptedSource};
    use crate::orchestrator::Ingestor;
    use nw_core::ArticleStore;
    use nw_storage::InMemoryStorage;

    fn runner(source: Arc<ScriptedSource>, store: Arc<InMemoryStorage>) -> Arc<IngestionRunner> {
        let ingestor = Ingestor::new(source, store, vec!["top".to_string()], "en");
        Arc::new(IngestionRunner::new(ingestor, RunGuard::new()))
    }

    #[test]
    fn test_normalize_schedule() {
        assert_eq!(normalize_schedule("*/30 * * * *"), "0 */30 * * * *");
        assert_eq!(normalize_schedule("  0 6 * * 1-5 "), "0 0 6 * * 1-5");
        assert_eq!(normalize_schedule("15 */5 * * * *"), "15 */5 * * * *");
    }

    #[test]
    fn test_validate_schedule() {
        assert_eq!(validate_schedule("*/30 * * * *").unwrap(), "0 */30 * * * *");
        assert!(validate_schedule("0 0 * * * *").is_ok());

        let err = validate_schedule("every half hour").unwrap_err();
        assert!(matches!(err, Error::ScheduleInvalid { .. }));
        assert!(matches!(validate_schedule("61 * * * *"), Err(Error::ScheduleInvalid { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_schedule_disables_scheduling_and_startup_run() {
        let source = Arc::new(ScriptedSource::default().script("top", None, page(&["a"], None)));
        let store = Arc::new(InMemoryStorage::new());

        let scheduler = start_scheduler(runner(source.clone(), store.clone()), "not a cron", true)
            .await
            .unwrap();
        assert!(scheduler.is_none());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(source.calls().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_valid_schedule_starts() {
        let source = Arc::new(ScriptedSource::default());
        let store = Arc::new(InMemoryStorage::new());

        let scheduler = start_scheduler(runner(source, store), "0 0 1 1 *", false)
            .await
            .unwrap();
        let mut scheduler = scheduler.expect("scheduler should start");
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_run_ingests() {
        let source = Arc::new(ScriptedSource::default().script("top", None, page(&["a", "b"], None)));
        let store = Arc::new(InMemoryStorage::new());

        spawn_startup_run(runner(source.clone(), store.clone())).await.unwrap();

        assert_eq!(source.calls().len(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
