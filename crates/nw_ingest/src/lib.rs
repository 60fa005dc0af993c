pub mod cli;
pub mod client;
pub mod config;
pub mod guard;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;

pub use cli::{handle_command, IngestArgs, IngestCommands};
pub use client::NewsDataClient;
pub use config::{parse_categories, IngestSettings};
pub use guard::{RunGuard, RunPermit};
pub use logging::init_logging;
pub use normalize::{normalize, parse_pub_date};
pub use orchestrator::{Ingestor, BATCH_DELAY, MAX_PAGES_PER_BATCH, PAGE_DELAY};
pub use runner::{IngestionRunner, Trigger};
pub use scheduler::{normalize_schedule, spawn_startup_run, start_scheduler, validate_schedule};

pub mod prelude {
    pub use super::{IngestSettings, IngestionRunner, Ingestor, NewsDataClient, RunGuard};
    pub use nw_core::{Error, NewsSource, Result, RunTotals};
}
