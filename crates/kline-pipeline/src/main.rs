//! K-line ETL - Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use kline_core::{Dataset, Layer};
use kline_pipeline::{Pipeline, PipelineConfig};
use tracing::{error, info};

/// Bronze/silver/gold ETL for Binance K-line data
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "KLINES_CONFIG", default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the configured klines window and rebuild bronze, silver and gold
    Full,
    /// Fetch trades after the checkpoint, then promote them
    Incremental,
    /// Promote bronze trades newer than the checkpoint's previous_id
    Promote,
    /// Write a fresh checkpoint at the given trade id
    InitCheckpoint {
        #[arg(long)]
        seed: u64,
        /// Overwrite an existing checkpoint
        #[arg(long)]
        force: bool,
    },
    /// Write a JSON column profile of one table
    Profile {
        #[arg(long)]
        layer: Layer,
        #[arg(long, value_enum, default_value_t = DatasetArg::Klines)]
        dataset: DatasetArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DatasetArg {
    Klines,
    Trades,
}

impl From<DatasetArg> for Dataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::Klines => Dataset::Klines,
            DatasetArg::Trades => Dataset::HistoricalTrades,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    kline_telemetry::init_logging()?;

    info!("Starting kline-pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %args.config, "Loading configuration");

    let config = PipelineConfig::from_file(&args.config)?;
    info!(
        symbol = %config.api.symbol,
        data_dir = %config.paths.data_dir.display(),
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(config);
    if let Err(e) = run(&pipeline, args.command).await {
        error!(error = %e, "Pipeline failed");
        return Err(e.into());
    }
    Ok(())
}

async fn run(pipeline: &Pipeline, command: Command) -> kline_pipeline::AppResult<()> {
    match command {
        Command::Full => {
            pipeline.run_full().await?;
        }
        Command::Incremental => {
            pipeline.run_incremental().await?;
        }
        Command::Promote => {
            pipeline.run_promote()?;
        }
        Command::InitCheckpoint { seed, force } => {
            pipeline.init_checkpoint(seed, force)?;
        }
        Command::Profile { layer, dataset } => {
            let path = pipeline.profile(layer, dataset.into())?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
