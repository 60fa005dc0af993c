use anyhow::Context;
use clap::Parser;
use nw_core::ArticleStore;
use nw_ingest::config::{DEFAULT_BASE_URL, DEFAULT_CATEGORIES, DEFAULT_LANGUAGE, DEFAULT_SCHEDULE};
use nw_ingest::{
    handle_command, init_logging, start_scheduler, IngestArgs, IngestSettings, IngestionRunner, Ingestor,
    NewsDataClient, RunGuard,
};
use nw_storage::{available_backends, create_storage};
use nw_web::{create_app, AppState};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "News ingestion service", long_about = None)]
pub struct Cli {
    /// Storage backend (memory or sqlite)
    #[arg(long, env = "NW_STORAGE", default_value = "memory")]
    storage: String,
    /// Database URL for the sqlite backend
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// newsdata.io API key. Ingestion is skipped while unset
    #[arg(long, env = "NEWSDATA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "NEWSDATA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Comma-separated categories, sent in groups of five
    #[arg(long, env = "NEWS_CATEGORIES", default_value = DEFAULT_CATEGORIES)]
    categories: String,
    #[arg(long, env = "NEWS_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    language: String,
    /// Cron expression for scheduled ingestion
    #[arg(long, env = "INGEST_CRON", default_value = DEFAULT_SCHEDULE)]
    schedule: String,
    /// Run one ingestion immediately when the scheduler starts
    #[arg(long, env = "INGEST_RUN_ON_STARTUP", value_parser = clap::builder::FalseyValueParser::new())]
    run_on_startup: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and run scheduled ingestion
    Serve {
        #[arg(long, env = "NW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// One-off ingestion commands
    Ingest(IngestArgs),
}

impl Cli {
    fn settings(&self) -> nw_core::Result<IngestSettings> {
        IngestSettings::new(
            self.api_key.clone(),
            &self.base_url,
            &self.categories,
            Some(&self.language),
            &self.schedule,
            self.run_on_startup,
        )
    }
}

async fn serve(
    store: Arc<dyn ArticleStore>,
    runner: Arc<IngestionRunner>,
    settings: &IngestSettings,
    bind: &str,
) -> anyhow::Result<()> {
    let scheduler = start_scheduler(Arc::clone(&runner), &settings.schedule, settings.run_on_startup)
        .await
        .context("Failed to start ingestion scheduler")?;

    let app = create_app(AppState::new(store, runner));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("🌐 Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(mut scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            warn!("⚠️ Failed to stop scheduler cleanly: {}", e);
        }
    }
    info!("👋 Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let settings = cli.settings().context("Invalid ingestion settings")?;

    info!(
        "💾 Opening {} storage (available: {})...",
        cli.storage,
        available_backends().join(", ")
    );
    let store = create_storage(&cli.storage, cli.database_url.as_deref())
        .await
        .with_context(|| format!("Failed to open {} storage", cli.storage))?;

    if settings.api_key.is_none() {
        warn!("⚠️ NEWSDATA_API_KEY is not set; ingestion runs will be skipped");
    }
    info!(
        categories = ?settings.categories,
        language = %settings.language,
        "📰 Ingesting {} categories in {} batches",
        settings.categories.len(),
        settings.batches().len()
    );

    let client = Arc::new(NewsDataClient::from_settings(&settings).context("Failed to build HTTP client")?);
    let ingestor = Ingestor::new(client, Arc::clone(&store), settings.categories.clone(), settings.language.clone());
    let runner = Arc::new(IngestionRunner::new(ingestor, RunGuard::new()));

    match cli.command {
        Commands::Serve { ref bind } => serve(store, runner, &settings, bind).await?,
        Commands::Ingest(args) => handle_command(args, &runner).await?,
    }

    Ok(())
}
