use clap::{Args, Subcommand};
use nw_core::Result;

use crate::runner::IngestionRunner;
use crate::scheduler::validate_schedule;

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(subcommand)]
    pub command: IngestCommands,
}

#[derive(Subcommand, Debug)]
pub enum IngestCommands {
    /// Run one ingestion pass now and print the totals
    Run,
    /// Show how the configured categories are grouped into requests
    Batches,
    /// Check a cron expression and print its normalized form
    CheckSchedule {
        /// Five-field cron, or six fields with seconds (e.g. "*/30 * * * *")
        expression: String,
    },
}

pub async fn handle_command(args: IngestArgs, runner: &IngestionRunner) -> Result<()> {
    match args.command {
        IngestCommands::Run => {
            let totals = runner.trigger_manual_ingestion().await?;
            println!(
                "✅ Ingested {} pages: {} new, {} updated",
                totals.pages, totals.upserted, totals.modified
            );
        }
        IngestCommands::Batches => {
            let ingestor = runner.ingestor();
            let batches = ingestor.batches();
            if batches.is_empty() {
                println!("No categories configured");
            }
            for (index, batch) in batches.iter().enumerate() {
                println!("  {}. [{}] {}", index + 1, ingestor.language(), batch);
            }
        }
        IngestCommands::CheckSchedule { expression } => {
            let normalized = validate_schedule(&expression)?;
            println!("⏰ {} -> {}", expression, normalized);
        }
    }
    Ok(())
}
