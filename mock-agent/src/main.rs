//! Mock Agent Binary Entry Point

use clap::Parser;
use mock_agent::logging::{init_logging, LoggingConfig};
use mock_agent::{run, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&LoggingConfig::with_level(args.log_level.clone()))?;

    tokio::select! {
        result = run(args) => {
            if let Err(e) = result {
                tracing::error!("mock-agent failed: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping...");
        }
    }

    Ok(())
}
