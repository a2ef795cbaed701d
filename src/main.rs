//! Midimix GW
//!
//! Keeps an Akai MIDImix in sync with PulseAudio/PipeWire streams and devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_stream::StreamExt;
use tracing::{info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midimix_gw::audio::{AudioServer, PactlGateway};
use midimix_gw::config::AppConfig;
use midimix_gw::midi::format_hex;
use midimix_gw::surface::{discovery, MidimixDriver, SurfaceEvent};
use midimix_gw::sync::{SyncEngine, SyncHandle, TargetRegistry};

/// Midimix Gateway - drive an Akai MIDImix from PulseAudio/PipeWire state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MIDIMIX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Midimix GW v{}...", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    info!("Configuration file: {}", config_path.display());

    if args.list_ports {
        // Highlighting the configured ports is best effort
        let config = AppConfig::load(&config_path).await.ok();
        discovery::print_ports(config.as_ref().map(|c| &c.midi))?;
        return Ok(());
    }

    let config = AppConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    info!("Configuration loaded successfully");

    run_app(config, shutdown_signal()).await?;

    info!("Midimix GW shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    let gateway = PactlGateway::connect(config.pulseaudio.pactl.clone())
        .await
        .context("Failed to connect to the audio server")?;
    let server: Arc<dyn AudioServer> = Arc::new(gateway);

    let mut surface = MidimixDriver::new(&config.midi);
    surface.connect()?;
    let mut surface_rx = surface
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Failed to get MIDImix event receiver"))?;
    let indicators = surface
        .indicators()
        .ok_or_else(|| anyhow::anyhow!("MIDImix output is not connected"))?;

    let registry = TargetRegistry::from_config(&config.pulseaudio.targets);
    info!("{} targets configured", registry.len());

    let engine = SyncEngine::new(registry, server.clone(), Arc::new(indicators));
    let handle = SyncHandle::spawn(engine);

    // Subscribe before the first scan so no change slips between the two
    let mut events = server
        .subscribe()
        .await
        .context("Failed to subscribe to audio server events")?;
    handle.bootstrap();

    let mut forward = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                handle.server_event(event);
            }
        })
    };

    // Devices that appear shortly after we start are missed by the first scan
    let delay = Duration::from_millis(config.pulseaudio.rebootstrap_delay_ms);
    if !delay.is_zero() {
        handle.bootstrap_after(delay);
    }

    info!("Ready to process MIDI events!");

    let channel = config.midi.channel;
    let max_input_value = config.midi.max_input_value;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = surface_rx.recv() => {
                trace!("MIDImix: {} | {}", format_hex(&event.raw_data), event.message);
                match SurfaceEvent::from_midi(&event.message, channel, max_input_value) {
                    Some(input) => handle.surface_event(input),
                    None => trace!("Ignoring {}", event.message),
                }
            }

            _ = &mut forward => {
                warn!("Audio server notification stream closed");
                break;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    forward.abort();
    handle.shutdown().await;

    surface.disconnect();

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
