//! vboost - paired maker/taker volume bot entry point.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

/// Paired maker/taker volume bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VBOOST_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Confirm trading on a live venue
    #[arg(long)]
    confirm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any WS connection
    vboost_ws::init_crypto();

    let args = Args::parse();

    vboost_telemetry::init_logging()?;

    info!("Starting vboost v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > VBOOST_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("VBOOST_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = vboost_bot::AppConfig::from_file(&config_path)?;
    info!(
        environment = ?config.environment,
        mode = ?config.mode,
        instrument = %config.instrument,
        "Configuration loaded"
    );

    if !args.confirm {
        warn!("This will execute REAL trades. Re-run with --confirm to proceed.");
        return Err(vboost_bot::AppError::NotConfirmed.into());
    }

    let app = vboost_bot::Application::new(config)?;

    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, finishing current round");
            shutdown.cancel();
        }
    });

    let report = app.run().await?;
    info!(
        successful = report.successful_rounds,
        failed = report.failed_rounds,
        volume_usd = %report.volume_usd.round_dp(2),
        "Run finished"
    );

    if let Some(reason) = report.halted {
        return Err(vboost_bot::AppError::Halted(reason).into());
    }
    Ok(())
}
