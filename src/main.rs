use std::env;
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use zbus::Connection;

use crate::config::{default_config_path, ConfigStore};
use crate::constants::{BRIDGE_PATH, BUS_NAME};
use crate::dbus::interface::BridgeInterface;
use crate::engine::command::EngineCommand;
use crate::engine::Engine;

mod config;
mod constants;
mod dbus;
mod drivers;
mod engine;
mod target;
mod udev;

/// Bridges a Sony DualSense or DualShock 4 controller to a virtual Xbox 360
/// pad, synthetic keyboard/mouse input, and the controller's lightbar, LEDs
/// and adaptive triggers.
#[derive(Parser, Debug)]
#[command(name = "padbridge", version)]
struct Args {
    /// Path to the configuration document.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log level filter (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let log_level = args
        .log_level
        .or_else(|| env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    env::set_var("RUST_LOG", log_level);
    env_logger::init();
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting padbridge v{VERSION}");

    let config_path = args.config.unwrap_or_else(default_config_path);
    let store = ConfigStore::load(config_path);
    if store.migration_notice {
        log::warn!("Configuration could not be migrated; continuing with defaults");
    }

    let (tx, rx) = mpsc::channel(engine::COMMAND_BUFFER);

    // Route SIGINT through the engine so held keys are released, the virtual
    // pad is unplugged, and hiding rules are removed.
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(EngineCommand::Shutdown).await;
        }
    });

    // The configuration UI reaches the engine over the system bus.
    let connection = Connection::system().await?;
    connection
        .object_server()
        .at(BRIDGE_PATH, BridgeInterface::new(tx.clone()))
        .await?;
    connection.request_name(BUS_NAME).await?;

    let mut engine = Engine::new(connection.clone(), rx, store);
    engine.run().await?;

    log::info!("padbridge stopped");
    Ok(())
}
