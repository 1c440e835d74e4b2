use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use niripipe::config::Config;

#[derive(Parser)]
#[command(
    name = "niripipe",
    version,
    about = "Automated retrieval and reduction pipeline for Gemini NIRI imaging data",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover science and calibration frames for a stack
    Find {
        /// Observation name, e.g. GN-2019A-FT-108-12
        obs_name: String,

        /// Write the discovered frame table as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full pipeline: find, download and reduce
    Run {
        /// Observation name, e.g. GN-2019A-FT-108-12
        obs_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("niripipe starting");

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Find { obs_name, output } => {
            tracing::info!(obs_name = %obs_name, output = ?output, "Starting find command");
            niripipe::commands::find(config, obs_name, output).await?;
        }

        Commands::Run { obs_name } => {
            tracing::info!(obs_name = %obs_name, "Starting run command");
            niripipe::commands::run(config, obs_name).await?;
        }
    }

    tracing::info!("niripipe completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("niripipe=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("niripipe=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
