//! ==============================================================================
//! main.rs - sensor bridge host entry point
//! ==============================================================================
//!
//! purpose:
//!     bridges the weather-station board on a serial port to any number of
//!     browsers, and relays their motor/steamer commands back to the board.
//!
//! responsibilities:
//!     - load configuration (config/host.toml or defaults)
//!     - open the serial link, or keep running without a device
//!     - run the telemetry loop (serial -> reading -> alerts -> observers)
//!     - serve the dashboard page, the websocket and the json api
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────────┐            ┌──────────────────────┐    │
//!     │  │ telemetry loop  │  publish   │ broadcast hub        │    │
//!     │  │ (telemetry.rs)  │ ─────────> │ (hub.rs)             │ ──────> observers
//!     │  └────────┬────────┘            └──────────┬───────────┘ <────── commands
//!     │           │ read_line                      │ dispatch         │
//!     │           │                     ┌──────────┴───────────┐    │
//!     │           │                     │ dispatcher.rs        │    │
//!     │           │                     └──────────┬───────────┘    │
//!     │           │                                │ write_token    │
//!     │        ┌──┴────────────────────────────────┴──┐             │
//!     │        │  device link (link.rs, one mutex)    │             │
//!     │        └──────────────────┬───────────────────┘             │
//!     └───────────────────────────┼─────────────────────────────────┘
//!                                 │ serial (9600 baud)
//!                          ┌──────┴──────┐
//!                          │ sensor board│
//!                          └─────────────┘
//!
//! failure model:
//!     nothing on the serial side stops the process. a missing board means
//!     no telemetry and commands that do nothing; a board that drops out is
//!     retried after a short backoff.
//!
//! ==============================================================================

mod alerts;
mod config;
mod dispatcher;
mod domain;
mod hub;
mod link;
mod parser;
mod server;
mod telemetry;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Bridge Host");
    println!("  serial board <-> websocket observers");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::HostConfig::load_or_default();
    init_tracing(&config.logging.level);
    config.print_summary();

    // step 2: open the serial link (absent is fine)
    let opener = Arc::new(link::SerialOpener::from_config(&config.serial));
    let link = link::DeviceLink::open_or_absent(opener);
    if link.is_connected() {
        println!("[STARTUP] ✓ Serial connected on {}", config.serial.port);
    } else {
        println!("[STARTUP] ⚠ No device on {} - running without serial", config.serial.port);
    }

    // step 3: wire dispatcher and hub
    let dispatcher = dispatcher::CommandDispatcher::new(link.clone());
    let hub = hub::BroadcastHub::new(config.telemetry.channel_capacity, dispatcher);

    // step 4: start the telemetry loop in background
    let telemetry = telemetry::TelemetryLoop::new(link.clone(), hub.clone(), &config);
    let stats = telemetry.stats();
    tokio::spawn(telemetry.run());

    // step 5: serve observers until the process exits
    let state = server::ServerState {
        hub,
        link,
        stats,
        index_path: PathBuf::from(&config.server.index_path),
    };
    println!("[STARTUP] ✓ Server running at http://{}", config.server.listen_addr());
    println!("────────────────────────────────────────────────────────────");

    if let Err(e) = server::run_server(&config.server, state).await {
        eprintln!("[ERROR] Web server error: {}", e);
        return Err(e);
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
