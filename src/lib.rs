#[macro_use]
pub mod error;         // file:line error macros

pub mod channels;      // Inter-component communication channels
pub mod config;        // Configuration management
pub mod coordinator;   // Decode + merge loop
pub mod ecoflow;       // EcoFlow wire format, reports and cloud transport
pub mod mqtt;          // Local MQTT publisher
pub mod options;       // Command line options parsing
pub mod prelude;       // Common imports and types
pub mod sensor;        // Named metrics derived from the device state
pub mod snapshot;      // Device state and its publication

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use crate::ecoflow::cloud::Cloud;
use crate::mqtt::Mqtt;
use std::time::Duration;

/// Sets up env_logger with our line format at the given default level.
pub fn init_logging(level: &str) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()?;

    Ok(())
}

/// Main application entry point
///
/// Loads the config, starts the cloud connection, the coordinator and the
/// local publisher, then waits for ctrl-c (or the optional runtime limit)
/// before stopping them in order.
pub async fn app(options: Options) -> Result<()> {
    // config loading logs, so this has to come first; the configured level
    // only applies where RUST_LOG isn't set
    let config = ConfigWrapper::new(options.config_file.clone()).or_else(|err| {
        let _ = init_logging("info");
        error!("Failed to load config: {:?}", err);
        Err(err)
    })?;
    if let Err(e) = init_logging(&config.loglevel()) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    info!("powerocean-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    info!("  Creating Coordinator...");
    let coordinator = Coordinator::new(config.clone(), channels.clone());
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("Coordinator task failed: {}", e);
        }
    });

    info!("  Creating MQTT client...");
    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.shared_stats.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("MQTT task failed: {}", e);
        }
    });

    info!("  Creating EcoFlow cloud client...");
    let cloud = Cloud::new(config.clone(), channels.clone());
    let cloud_clone = cloud.clone();
    let cloud_handle = tokio::spawn(async move {
        if let Err(e) = cloud_clone.start().await {
            error!("EcoFlow cloud task failed: {}", e);
        }
    });

    match options.runtime {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("runtime of {}s reached", secs),
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl+c: {}", e);
            }
        }
    }

    info!("Stopping all components...");

    // each stage is drained before the next is told to stop, so nothing a
    // payload produced is still in flight when the publisher exits
    cloud.stop();
    if let Err(e) = cloud_handle.await {
        error!("Error waiting for cloud task: {}", e);
    }

    coordinator.stop();
    if let Err(e) = coordinator_handle.await {
        error!("Error waiting for coordinator task: {}", e);
    }

    mqtt.stop();
    if let Err(e) = mqtt_handle.await {
        error!("Error waiting for mqtt task: {}", e);
    }

    if let Ok(stats) = coordinator.shared_stats.lock() {
        stats.print_summary();
    }

    info!("Shutdown complete");
    Ok(())
}
