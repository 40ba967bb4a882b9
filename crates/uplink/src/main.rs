mod cli;
mod config;
mod error;

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uplink_core::{Lifecycle, NetworkGate, Supervisor, WebSocketConnector};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, debug: bool) {
    let filter = match (debug, verbosity) {
        (true, 0 | 1) | (false, 1) => "debug",
        (false, 0) => "info",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let raw = config::resolve(&cli)?;

    if cli.print_config {
        print!("{}", uplink_config::render_config(&raw)?);
        return Ok(());
    }

    init_tracing(cli.verbose, raw.debug);

    // Validation failures exit here, before any network traffic.
    let config = uplink_core::validate(&raw)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        device_id = %config.device_id,
        model = %config.hardware_model,
        serial = %config.hardware_serial_number,
        firmware = %config.firmware_name,
        boot_time = config.boot_time,
        "starting uplink"
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut lifecycle = Lifecycle::new();
    let supervisor =
        Supervisor::new(WebSocketConnector).with_network_gate(NetworkGate::from_config(&config));

    let started = tokio::select! {
        result = supervisor.start(&config, &mut lifecycle) => Some(result?),
        _ = sigterm.recv() => None,
        _ = sigint.recv() => None,
    };

    match started {
        Some(handle) => {
            info!(report = ?handle.report(), "bootstrap complete");
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        }
        None => warn!("interrupted during bootstrap"),
    }

    lifecycle
        .stop()
        .await
        .map_err(|source| CliError::Shutdown { source })?;
    info!("uplink stopped");
    Ok(())
}
