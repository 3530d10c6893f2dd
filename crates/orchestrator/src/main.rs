use anyhow::Result;
use clap::Parser;
use log::{debug, error};
use orchestrator::cli::Cli;
use orchestrator::utils::signal::cancel_on_shutdown_signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level_filter();
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    debug!("Log level: {log_level}");

    let cancellation_token = CancellationToken::new();
    let signal_handle = cancel_on_shutdown_signal(cancellation_token.clone())?;

    let result = cli.run(cancellation_token.clone()).await;

    cancellation_token.cancel();
    if let Err(e) = signal_handle.await {
        error!("Signal handler task failed: {e}");
    }
    result
}
