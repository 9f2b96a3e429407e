mod cli;

use std::sync::Arc;

use bundlebox::config::Config;
use bundlebox::job::{Job, JobSubmission, validate_submission};
use bundlebox::observability::Metrics;
use bundlebox::pipeline::{JobOutcome, Orchestrator};
use clap::Parser;
use cli::{AssembleArgs, Cli, Commands};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Server(args) => {
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            bundlebox::api::run(config).await?
        }
        Commands::Assemble(args) => assemble(config, args).await?,
    }

    Ok(())
}

async fn assemble(config: Config, args: AssembleArgs) -> Result<(), AnyError> {
    let raw = tokio::fs::read(&args.job).await?;
    let submission: JobSubmission = serde_json::from_slice(&raw)?;
    validate_submission(&submission, config.server.max_entries_per_job)?;

    let job = Job::from_submission(Uuid::now_v7().to_string(), submission);
    let orchestrator = Orchestrator::from_config(&config, Arc::new(Metrics::new()))?;

    match orchestrator.run(job).await {
        JobOutcome::Completed(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        JobOutcome::Failed {
            processed, reason, ..
        } => Err(format!("archive not created ({processed} files processed): {reason}").into()),
    }
}
