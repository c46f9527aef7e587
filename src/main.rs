use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vario::client::{DeviceClient, DeviceClientConfig};
use vario::config::InstrumentConfig;
use vario::instrument::{CoreEvent, InstrumentCore};

#[derive(Parser)]
#[command(name = "vario", about = "Glider navigation instrument core", version)]
struct Cli {
    /// Path to the instrument config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the sensor device and run the instrument loop
    Run {
        /// Device host, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Device port, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Feed a recorded sentence log through the core and print the events
    Replay {
        /// File with one raw sentence per line
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => InstrumentConfig::load(path)?,
        None => InstrumentConfig::default(),
    };

    match cli.command {
        Command::Run { host, port } => handle_run(config, host, port).await,
        Command::Replay { file } => handle_replay(config, &file),
    }
}

async fn handle_run(
    mut config: InstrumentConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.device.host = host;
    }
    if let Some(port) = port {
        config.device.port = port;
    }

    info!(
        "Starting instrument core against {}:{}",
        config.device.host, config.device.port
    );

    let mut core = InstrumentCore::new(&config);
    let client = DeviceClient::new(DeviceClientConfig::from_config(&config.device));

    let ingest = client.run(
        |line, received_at| {
            for event in core.process_line(line, received_at) {
                print_event(&event);
            }
        },
        |event| warn!("Device health: {event:?}"),
    );

    tokio::select! {
        result = ingest => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

fn handle_replay(mut config: InstrumentConfig, file: &std::path::Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading sentence log {}", file.display()))?;

    // Recorded fixes are old by definition; staleness only applies live
    config.position.stale_fix_seconds = 0;

    let mut core = InstrumentCore::new(&config);
    let mut lines = 0usize;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines += 1;
        for event in core.process_line(line, Utc::now()) {
            print_event(&event);
        }
    }

    info!(
        "Replayed {lines} lines, {} dropped",
        core.dropped_sentences()
    );
    Ok(())
}

/// Events go to stdout as JSON lines; logs stay on stderr
fn print_event(event: &CoreEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to serialize event: {e}"),
    }
}
