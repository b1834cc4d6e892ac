//! Command-line interface for mongo-extract
//!
//! # Usage Examples
//!
//! ```bash
//! # Run all configured exports
//! mongo-extract run --data-dir /data
//!
//! # Validate connectivity and credentials only
//! mongo-extract test-connection --data-dir /data
//! ```
//!
//! The data directory holds `config.json`, optional prior state in
//! `in/state.json`, and receives `out/tables/*.csv`, their manifests and
//! `out/state.json`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mongo_extract::{Config, Extractor};

#[derive(Parser)]
#[command(name = "mongo-extract")]
#[command(about = "Exports MongoDB collections into CSV tables via mongoexport")]
#[command(long_about = None)]
struct Cli {
    /// Data directory with config.json, in/ and out/
    #[arg(long, env = "MONGO_EXTRACT_DATADIR", default_value = "/data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled export and persist tables, manifests and state
    Run,

    /// Test connectivity and credentials, then exit
    TestConnection,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.data_dir.join("config.json"))?;
    let mut extractor = Extractor::new(config, &cli.data_dir)?;

    match cli.command {
        Commands::Run => {
            extractor.extract().await?;
            tracing::info!("Extraction completed successfully");
        }
        Commands::TestConnection => {
            extractor.test_connection().await?;
            tracing::info!("Connection test succeeded");
        }
    }

    Ok(())
}
