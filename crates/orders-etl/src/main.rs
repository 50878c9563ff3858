//! Orders ETL - incremental order synchronization daemon

use anyhow::Result;
use clap::{Parser, Subcommand};
use etl_common::logging::{init_logging, LogConfig, LogLevel};
use orders_etl::{EtlConfig, Pipeline};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "orders-etl")]
#[command(author, version, about = "Incremental orders ETL pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ETL loop until interrupted
    Run,

    /// Run a single ETL cycle and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("orders-etl".to_string())
        .build();

    // Environment variables take precedence over the CLI defaults
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = EtlConfig::from_env()?;
    let mut pipeline = Pipeline::new(config)?;

    match cli.command {
        Command::Run => {
            info!("Starting orders ETL loop");
            pipeline.run().await?;
        },
        Command::Once => {
            let summary = pipeline.once().await?;
            info!(
                extracted = summary.extracted,
                indexed = summary.indexed,
                file_rows = summary.file_rows,
                "Single ETL cycle complete"
            );
        },
    }

    Ok(())
}
